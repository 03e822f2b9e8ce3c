use crate::{
    config::SimConfig,
    election::{ElectionRule, ResidualElection},
    energy::{EnergyModel, FixedCost},
    error::WsnError,
    event_queue::{Event, EventKey},
    link::{LinkQuality, LogDistance},
    medium::Medium,
    node::Node,
    report::{RoundReport, SimulationStats},
    scene::{Scene, TraceScene},
    sink::Sink,
    state_machine::{NodeInput, StateMachine},
    types::{Action, Envelope, NodeId, Position, Role},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// A deployment of sensor nodes and one sink, driven by a deterministic
/// discrete-event scheduler.
///
/// Given the same configuration, positions and seed, every run produces
/// identical reports.
pub struct Network<
    R: ElectionRule = ResidualElection,
    E: EnergyModel = FixedCost,
    L: LinkQuality = LogDistance,
> {
    config: SimConfig,

    /// Sensor nodes, indexed by id.
    nodes: Vec<Node<R, E>>,

    /// The sink; its id follows the last sensor.
    sink: Sink,

    /// Inbox senders for every station, sink last.
    mailboxes: Vec<UnboundedSender<Envelope>>,

    /// Geometry and link quality.
    medium: Medium<L>,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, Event>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    /// Next round to run.
    round: u64,

    stats: SimulationStats,

    scene: Box<dyn Scene>,
}

impl Network {
    /// Creates a network with the default election, energy and link models.
    ///
    /// # Arguments
    /// * `config` - Simulation configuration; validated here.
    /// * `positions` - Sensor positions; sensor `i` gets id `i`.
    pub fn new(config: SimConfig, positions: Vec<Position>) -> Result<Self, WsnError> {
        let rule = ResidualElection::new(config.protocol.tie_break);
        let energy = FixedCost::new(config.protocol.tx_cost)?;
        let link = LogDistance::new(&config.radio, config.seed);
        Self::with_models(config, positions, rule, energy, link)
    }
}

impl<R: ElectionRule, E: EnergyModel, L: LinkQuality> Network<R, E, L> {
    /// Creates a network with caller-supplied models.
    pub fn with_models(
        config: SimConfig,
        positions: Vec<Position>,
        rule: R,
        energy: E,
        link: L,
    ) -> Result<Self, WsnError> {
        config.validate()?;
        if positions.is_empty() {
            return Err(WsnError::InvalidConfig(
                "a deployment needs at least one sensor".into(),
            ));
        }

        let sink_id = positions.len();
        let protocol = Arc::new(config.protocol.clone());
        let mut nodes = Vec::with_capacity(sink_id);
        let mut mailboxes = Vec::with_capacity(sink_id + 1);
        for id in 0..sink_id {
            let (node, sender) = Node::new(
                id,
                sink_id,
                config.radio.tx_range,
                Arc::clone(&protocol),
                rule.clone(),
                energy.clone(),
                config.seed,
            );
            nodes.push(node);
            mailboxes.push(sender);
        }
        let (sink, sender) = Sink::new(sink_id, Arc::clone(&protocol));
        mailboxes.push(sender);

        let medium = Medium::new(
            positions,
            config.sink.position,
            config.radio.tx_range,
            config.sink.range,
            link,
            config.seed,
        );

        info!(
            sensors = sink_id,
            seed = config.seed,
            routing = ?config.protocol.routing,
            "network created"
        );
        Ok(Self {
            config,
            nodes,
            sink,
            mailboxes,
            medium,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            round: 0,
            stats: SimulationStats::default(),
            scene: Box::new(TraceScene),
        })
    }

    /// Replaces the visualization scene.
    pub fn with_scene(mut self, scene: impl Scene + 'static) -> Self {
        self.scene = Box::new(scene);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of rounds completed so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    pub fn nodes(&self) -> &[Node<R, E>] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Result<&Node<R, E>, WsnError> {
        self.nodes.get(id).ok_or(WsnError::UnknownNode(id))
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn sink_id(&self) -> NodeId {
        self.medium.sink_id()
    }

    pub fn medium(&self) -> &Medium<L> {
        &self.medium
    }

    /// Moves a station; takes effect from the next transmission.
    pub fn move_node(&mut self, id: NodeId, position: Position) -> Result<(), WsnError> {
        self.medium.move_node(id, position)
    }

    /// Runs every round and collects the reports.
    pub async fn simulate(&mut self, rounds: u64) -> Result<Vec<RoundReport>, WsnError> {
        let mut reports = Vec::new();
        for _ in 0..rounds {
            reports.push(self.run_round()?);
            tokio::task::yield_now().await;
        }
        Ok(reports)
    }

    /// Runs one full round, from reset to the next round boundary.
    pub fn run_round(&mut self) -> Result<RoundReport, WsnError> {
        let round = self.round;
        let end = self.now + self.config.rounds.interval();
        self.start_round(round)?;
        self.run_until(end)?;
        self.round += 1;

        let report = self.report(round);
        info!(
            round,
            heads = report.role_count(Role::ClusterHead),
            members = report.role_count(Role::Member),
            undecided = report.role_count(Role::Undefined),
            routed = report.parents.len(),
            delivered = report.delivered.len(),
            "round complete"
        );
        Ok(report)
    }

    fn start_round(&mut self, round: u64) -> Result<(), WsnError> {
        let stale = self
            .event_queue
            .values()
            .filter(|event| matches!(event, Event::Deliver(_)))
            .count() as u64;
        if stale > 0 {
            debug!(round, stale, "discarding in-flight messages");
        }
        self.stats.messages_discarded_reset += stale;
        self.event_queue.clear();

        let recharge = !self.config.rounds.carry_energy;
        for node in &mut self.nodes {
            node.reset(recharge);
        }
        self.sink.reset(recharge);

        if round > 0 {
            let rounds = &self.config.rounds;
            self.medium
                .perturb(rounds.max_displacement, rounds.terrain_width, rounds.terrain_height);
        }
        self.medium.begin_round();

        debug!(round, t_ms = self.now.as_millis() as u64, "round started");
        for id in 0..self.nodes.len() {
            let neighbors = self.medium.neighbors_in_range(id)?;
            self.schedule(
                Duration::ZERO,
                id,
                Event::Input(NodeInput::RoundStart { round, neighbors }),
            );
        }
        self.schedule(
            Duration::ZERO,
            self.sink_id(),
            Event::Input(NodeInput::RoundStart {
                round,
                neighbors: Vec::new(),
            }),
        );
        Ok(())
    }

    /// Processes queued events strictly before `end`, then advances the clock to `end`.
    fn run_until(&mut self, end: Duration) -> Result<(), WsnError> {
        while let Some((key, _)) = self.event_queue.first_key_value() {
            if key.time >= end {
                break;
            }
            let Some((key, event)) = self.event_queue.pop_first() else {
                break;
            };
            self.now = key.time;
            self.stats.events_processed += 1;
            self.dispatch(key.node, event)?;
        }
        self.now = end;
        Ok(())
    }

    fn schedule(&mut self, delay: Duration, station: NodeId, event: Event) {
        let key = EventKey::new(self.now + delay, &event, station, self.sequence);
        self.sequence += 1;
        self.event_queue.insert(key, event);
    }

    fn station_mut(&mut self, id: NodeId) -> Result<&mut dyn StateMachine, WsnError> {
        if id == self.medium.sink_id() {
            return Ok(&mut self.sink);
        }
        self.nodes
            .get_mut(id)
            .map(|node| node as &mut dyn StateMachine)
            .ok_or(WsnError::UnknownNode(id))
    }

    fn dispatch(&mut self, station: NodeId, event: Event) -> Result<(), WsnError> {
        let actions = match event {
            Event::Input(input) => self.station_mut(station)?.handle(input),
            Event::Deliver(envelope) => {
                let mailbox = self
                    .mailboxes
                    .get(station)
                    .ok_or(WsnError::UnknownNode(station))?;
                mailbox
                    .send(envelope)
                    .map_err(|_| WsnError::MailboxClosed(station))?;
                self.stats.messages_delivered += 1;
                self.station_mut(station)?.drain_inbox()
            }
        };
        self.apply(station, actions)
    }

    fn apply(&mut self, station: NodeId, actions: Vec<Action>) -> Result<(), WsnError> {
        for action in actions {
            match action {
                Action::Send {
                    target,
                    message,
                    delay,
                } => {
                    self.stats.messages_sent += 1;
                    let transmission = self.medium.transmit(station, target, &message)?;
                    self.stats.messages_dropped_range += transmission.dropped;
                    for (to, envelope) in transmission.deliveries {
                        self.schedule(delay, to, Event::Deliver(envelope));
                    }
                }
                Action::SetTimer { timer, delay } => {
                    self.stats.timers_set += 1;
                    self.schedule(delay, station, Event::timer(timer));
                }
                Action::Visual(visual) => self.scene.draw(self.now, station, &visual),
            }
        }
        Ok(())
    }

    fn report(&self, round: u64) -> RoundReport {
        let mut report = RoundReport {
            round,
            roles: BTreeMap::new(),
            official_heads: BTreeMap::new(),
            members: BTreeMap::new(),
            gateways: BTreeMap::new(),
            parents: BTreeMap::new(),
            delivered: self.sink.delivered().to_vec(),
            residual_energy: BTreeMap::new(),
            stats: self.stats,
        };
        for node in &self.nodes {
            let id = node.id();
            let role = node.role();
            report.roles.insert(id, role);
            report.residual_energy.insert(id, node.residual());
            if let Some(head) = node.official_head() {
                report.official_heads.insert(id, head);
            }
            if role == Role::ClusterHead {
                report.members.insert(id, node.members());
                report.gateways.insert(id, node.gateways());
                if let Some(parent) = node.parent() {
                    report.parents.insert(id, parent);
                }
            }
        }
        report
    }
}
