//! Per-node protocol state machine.
//!
//! A node moves through election, cluster formation, routing and data
//! forwarding once per round. Behavior is dispatched on the pair (current
//! role, message kind); messages inconsistent with the current role are
//! dropped without error.

use crate::cluster::{HeadState, MemberState};
use crate::config::{ProtocolConfig, RouteMetric, RoutingStrategy};
use crate::data::AggregationBuffer;
use crate::election::{Candidate, ElectionRule, ResidualElection};
use crate::energy::{Battery, EnergyModel, FixedCost};
use crate::routing::{parent_selection_value, Offer, Parent, PsvExchange, RouteTable};
use crate::state_machine::{NodeInput, StateMachine, TimerKind};
use crate::types::{
    Action, Color, Envelope, HeardHead, LinkStyle, Message, MessageKind, Neighbor, NodeId,
    Record, Role, Target, Visual,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace, warn};

/// State held while a node leads a cluster.
#[derive(Debug, Clone)]
pub struct HeadRole {
    pub cluster: HeadState,
    pub routes: RouteTable,
    pub psv: PsvExchange,
    /// Parent chosen by the parent-selection exchange.
    pub selected_parent: Option<Parent>,
}

impl HeadRole {
    fn new(sink: NodeId, metric: RouteMetric) -> Self {
        Self {
            cluster: HeadState::default(),
            routes: RouteTable::new(sink, metric),
            psv: PsvExchange::default(),
            selected_parent: None,
        }
    }
}

/// Role together with the state only that role owns.
#[derive(Debug, Clone)]
pub enum RoleState {
    Undefined(Candidate),
    Member(MemberState),
    ClusterHead(Box<HeadRole>),
}

impl RoleState {
    pub fn role(&self) -> Role {
        match self {
            RoleState::Undefined(_) => Role::Undefined,
            RoleState::Member(_) => Role::Member,
            RoleState::ClusterHead(_) => Role::ClusterHead,
        }
    }
}

/// A simulated sensor node.
pub struct Node<R: ElectionRule = ResidualElection, E: EnergyModel = FixedCost> {
    /// Unique node identifier.
    id: NodeId,

    /// Identifier of the sink.
    sink: NodeId,

    /// Transmission range, used for the head's coverage circle.
    tx_range: f64,

    config: Arc<ProtocolConfig>,

    /// Election scoring and promotion rule.
    rule: R,

    /// Cost of each transmission.
    energy: E,

    battery: Battery,

    /// Current round number.
    round: u64,

    state: RoleState,

    /// Sensors in range, as reported at round start.
    neighbors: Vec<Neighbor>,

    /// Readings awaiting the next forward; survives round resets.
    buffer: AggregationBuffer,

    /// Sequence number of the next aggregate this node forwards.
    forward_seq: u32,

    /// Jitter source, seeded per node.
    rng: ChaCha8Rng,

    /// Receiver for incoming envelopes.
    inbox: UnboundedReceiver<Envelope>,
}

impl<R: ElectionRule, E: EnergyModel> Node<R, E> {
    /// Creates a node with a full battery.
    ///
    /// # Returns
    /// A tuple of the node and the sender feeding its inbox.
    pub fn new(
        id: NodeId,
        sink: NodeId,
        tx_range: f64,
        config: Arc<ProtocolConfig>,
        rule: R,
        energy: E,
        seed: u64,
    ) -> (Self, UnboundedSender<Envelope>) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let node_seed = seed
            .wrapping_add(id as u64)
            .wrapping_mul(0x517c_c1b7_2722_0a95);
        (
            Self {
                id,
                sink,
                tx_range,
                battery: Battery::new(config.initial_energy),
                config,
                rule,
                energy,
                round: 0,
                state: RoleState::Undefined(Candidate::default()),
                neighbors: Vec::new(),
                buffer: AggregationBuffer::new(),
                forward_seq: 0,
                rng: ChaCha8Rng::seed_from_u64(node_seed),
                inbox,
            },
            sender,
        )
    }

    pub fn role(&self) -> Role {
        self.state.role()
    }

    pub fn state(&self) -> &RoleState {
        &self.state
    }

    pub fn residual(&self) -> f64 {
        self.battery.residual()
    }

    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// Election score computed at the start of the round, while undecided.
    pub fn score(&self) -> Option<f64> {
        match &self.state {
            RoleState::Undefined(candidate) => Some(candidate.score),
            _ => None,
        }
    }

    pub fn official_head(&self) -> Option<NodeId> {
        match &self.state {
            RoleState::Member(member) => Some(member.official_head),
            _ => None,
        }
    }

    pub fn known_heads(&self) -> &[HeardHead] {
        match &self.state {
            RoleState::Member(member) => &member.known_heads,
            _ => &[],
        }
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.head()
            .map(|head| head.cluster.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Adjacent head -> gateway members, empty unless this node is a head.
    pub fn gateways(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        self.head()
            .map(|head| head.cluster.adjacency.snapshot())
            .unwrap_or_default()
    }

    /// Upstream relay under the configured routing strategy.
    pub fn parent(&self) -> Option<Parent> {
        let head = self.head()?;
        match self.config.routing {
            RoutingStrategy::Flood => head.routes.parent(),
            RoutingStrategy::ParentSelection => head.selected_parent,
        }
    }

    pub fn buffered(&self) -> &[Record] {
        self.buffer.records()
    }

    fn head(&self) -> Option<&HeadRole> {
        match &self.state {
            RoleState::ClusterHead(head) => Some(head),
            _ => None,
        }
    }

    fn can_transmit(&self) -> bool {
        !(self.config.halt_when_depleted && self.battery.is_depleted())
    }

    /// Drains the battery and queues `message`; suppressed when depleted and gated.
    fn transmit(&mut self, out: &mut Vec<Action>, target: Target, message: Message) {
        if !self.can_transmit() {
            debug!(
                node = self.id,
                kind = message.kind.name(),
                "battery depleted, transmission suppressed"
            );
            return;
        }
        self.battery.drain(self.energy.transmission_cost(&message.kind));
        trace!(node = self.id, ?target, kind = message.kind.name(), "transmit");
        out.push(Action::Send {
            target,
            message,
            delay: self.config.broadcast_delay(),
        });
    }

    fn send(&mut self, out: &mut Vec<Action>, target: Target, kind: MessageKind) {
        let message = Message::new(self.id, kind);
        self.transmit(out, target, message);
    }

    fn next_forward_seq(&mut self) -> u32 {
        let seq = self.forward_seq;
        self.forward_seq = self.forward_seq.wrapping_add(1);
        seq
    }

    fn promote(&mut self, out: &mut Vec<Action>, reason: &'static str) {
        info!(node = self.id, round = self.round, reason, "promoted to cluster head");
        self.state = RoleState::ClusterHead(Box::new(HeadRole::new(
            self.sink,
            self.config.route_metric,
        )));
        out.push(Action::Visual(Visual::NodeColor {
            node: self.id,
            color: Color::ClusterHead,
        }));
        out.push(Action::Visual(Visual::Circle {
            node: self.id,
            radius: self.tx_range,
        }));
        self.send(out, Target::Broadcast, MessageKind::IAmClusterHead);
    }

    fn begin_round(&mut self, round: u64, neighbors: Vec<Neighbor>) -> Vec<Action> {
        let mut out = Vec::new();
        self.round = round;
        let score = self.rule.score(self.battery.residual(), &neighbors);
        self.neighbors = neighbors;
        self.state = RoleState::Undefined(Candidate::new(score));
        debug!(
            node = self.id,
            round,
            score,
            neighbors = self.neighbors.len(),
            "round started"
        );
        out.push(Action::Visual(Visual::NodeColor {
            node: self.id,
            color: Color::Idle,
        }));
        self.send(&mut out, Target::Broadcast, MessageKind::NodeResidual { score });
        out.push(Action::SetTimer {
            timer: TimerKind::ElectionWindow,
            delay: self.config.broadcast_delay() + self.config.election_window(),
        });
        out
    }

    fn on_timer(&mut self, timer: TimerKind) -> Vec<Action> {
        let mut out = Vec::new();
        match timer {
            TimerKind::ElectionWindow => {
                let wins = match &self.state {
                    RoleState::Undefined(candidate) => self.rule.should_promote(
                        self.id,
                        candidate.score,
                        &candidate.neighbor_scores,
                    ),
                    _ => false,
                };
                if wins {
                    self.promote(&mut out, "election window closed");
                }
                out.push(Action::SetTimer {
                    timer: TimerKind::SteadyPhase,
                    delay: self.config.announce_window(),
                });
            }
            TimerKind::SteadyPhase => self.enter_steady_phase(&mut out),
            TimerKind::RouteSetup => self.announce_psv(&mut out),
            TimerKind::ParentDecision => self.decide_parent(&mut out),
            TimerKind::DataTick(seq) => self.send_reading(&mut out, seq),
            TimerKind::ForwardTick(_) => self.forward_aggregate(&mut out),
        }
        out
    }

    fn enter_steady_phase(&mut self, out: &mut Vec<Action>) {
        if let RoleState::Undefined(candidate) = &mut self.state {
            if !self.config.promote_orphans {
                candidate.closed = true;
                warn!(node = self.id, round = self.round, "still undecided at steady phase");
                return;
            }
            self.promote(out, "undecided at steady phase");
        }

        match &self.state {
            RoleState::Member(member) => {
                let kind = MessageKind::MyClusterHeads {
                    heads: member.known_heads.clone(),
                    residual: self.battery.residual(),
                };
                debug!(
                    node = self.id,
                    official = member.official_head,
                    heard = member.known_heads.len(),
                    "advertising known cluster heads"
                );
                self.send(out, Target::Broadcast, kind);
                for k in 0..self.config.records_per_round {
                    let jitter = self
                        .rng
                        .gen_range(self.config.data_jitter_min_ms..=self.config.data_jitter_max_ms);
                    out.push(Action::SetTimer {
                        timer: TimerKind::DataTick(k),
                        delay: self.config.data_tick_offset(k) + Duration::from_millis(jitter),
                    });
                }
            }
            RoleState::ClusterHead(_) => {
                for k in 0..self.config.records_per_round {
                    out.push(Action::SetTimer {
                        timer: TimerKind::ForwardTick(k),
                        delay: self.config.forward_tick_offset(k),
                    });
                }
                if self.config.routing == RoutingStrategy::ParentSelection {
                    out.push(Action::SetTimer {
                        timer: TimerKind::RouteSetup,
                        delay: self.config.route_setup_delay(),
                    });
                }
            }
            RoleState::Undefined(_) => {}
        }
    }

    fn announce_psv(&mut self, out: &mut Vec<Action>) {
        let RoleState::ClusterHead(head) = &mut self.state else {
            return;
        };
        let psv = parent_selection_value(
            self.battery.residual(),
            &head.cluster.adjacency.distinct_gateways(),
        );
        head.psv.own = Some(psv);
        let adjacency = &head.cluster.adjacency;
        let relays: Vec<(NodeId, NodeId)> = adjacency
            .adjacent_heads()
            .filter_map(|adjacent| adjacency.best_gateway(adjacent).map(|g| (adjacent, g.member)))
            .collect();
        debug!(node = self.id, psv, adjacent = relays.len(), "announcing parent-selection value");

        for (adjacent, gateway) in relays {
            let inner = Box::new(MessageKind::ClusterHeadResidual { psv });
            self.send(out, Target::Node(gateway), MessageKind::Relay { to: adjacent, inner });
        }
        out.push(Action::SetTimer {
            timer: TimerKind::ParentDecision,
            delay: self.config.psv_window(),
        });
    }

    fn decide_parent(&mut self, out: &mut Vec<Action>) {
        let (id, tie_break) = (self.id, self.config.tie_break);
        let RoleState::ClusterHead(head) = &mut self.state else {
            return;
        };
        let parent = head.psv.choose_parent(tie_break, id);
        head.selected_parent = Some(parent);
        info!(node = id, ?parent, heard = head.psv.received.len(), "parent selected");
        if let Parent::Head(upstream) = parent {
            out.push(Action::Visual(Visual::Link {
                from: id,
                to: upstream,
                style: LinkStyle::Route,
            }));
        }
    }

    fn send_reading(&mut self, out: &mut Vec<Action>, seq: u32) {
        let Some(official) = self.official_head() else {
            return;
        };
        if !self.buffer.is_empty() && self.can_transmit() {
            let records = self.buffer.take();
            debug!(
                node = self.id,
                head = official,
                records = records.len(),
                "handing held aggregate to official head"
            );
            let combine_seq = self.next_forward_seq();
            self.send(
                out,
                Target::Node(official),
                MessageKind::DataCombine {
                    seq: combine_seq,
                    records,
                },
            );
        }
        let payload = format!("residual={:.1}", self.battery.residual());
        self.send(out, Target::Node(official), MessageKind::Data { seq, payload });
    }

    fn forward_aggregate(&mut self, out: &mut Vec<Action>) {
        if self.buffer.is_empty() {
            trace!(node = self.id, "nothing to forward");
            return;
        }
        let Some(parent) = self.parent() else {
            debug!(node = self.id, held = self.buffer.len(), "no parent yet, holding aggregate");
            return;
        };
        let hop = match parent {
            Parent::Sink => Some((Target::Sink, None)),
            Parent::Head(upstream) => self
                .head()
                .and_then(|head| head.cluster.adjacency.best_gateway(upstream))
                .map(|gateway| (Target::Node(gateway.member), Some(upstream))),
        };
        let Some((target, relay_to)) = hop else {
            debug!(node = self.id, ?parent, "no gateway toward parent, holding aggregate");
            return;
        };
        if !self.can_transmit() {
            debug!(node = self.id, "battery depleted, holding aggregate");
            return;
        }

        let seq = self.next_forward_seq();
        let records = self.buffer.take();
        info!(node = self.id, ?parent, seq, records = records.len(), "forwarding aggregate");
        let combine = MessageKind::DataCombine { seq, records };
        let kind = match relay_to {
            Some(to) => MessageKind::Relay {
                to,
                inner: Box::new(combine),
            },
            None => combine,
        };
        self.send(out, target, kind);
    }

    fn on_message(&mut self, envelope: Envelope) -> Vec<Action> {
        let mut out = Vec::new();
        let Envelope {
            from,
            message,
            distance,
            quality,
        } = envelope;
        let src = message.source;
        trace!(node = self.id, from, src, kind = message.kind.name(), "received");

        match message.kind {
            MessageKind::NodeResidual { score } => {
                if let RoleState::Undefined(candidate) = &mut self.state {
                    candidate.neighbor_scores.insert(src, score);
                }
            }
            MessageKind::IAmClusterHead => self.on_head_announcement(&mut out, src, quality),
            MessageKind::IAmClusterMember { head } => {
                self.on_member_announcement(&mut out, src, head)
            }
            MessageKind::MyClusterHeads { heads, residual } => {
                let id = self.id;
                if let RoleState::ClusterHead(head) = &mut self.state {
                    let touched = head.cluster.adjacency.record(
                        id, src, distance, quality, &heads, residual,
                    );
                    for adjacent in touched {
                        out.push(Action::Visual(Visual::Link {
                            from: src,
                            to: adjacent,
                            style: LinkStyle::Gateway,
                        }));
                    }
                }
            }
            MessageKind::ClusterHeadResidual { psv } => {
                if let RoleState::ClusterHead(head) = &mut self.state {
                    head.psv.received.insert(src, psv);
                }
            }
            MessageKind::RouteToSink {
                hop_count,
                accumulated_quality,
                visited_path,
            } => self.on_route_advertisement(
                &mut out,
                src,
                hop_count,
                accumulated_quality,
                &visited_path,
                quality,
            ),
            MessageKind::Data { seq, payload } => {
                if matches!(self.state, RoleState::ClusterHead(_)) {
                    self.buffer.push(Record {
                        round: self.round,
                        source: src,
                        seq,
                        payload,
                    });
                } else {
                    trace!(node = self.id, src, "reading for a head we are not, ignored");
                }
            }
            MessageKind::DataCombine { records, .. } => {
                if matches!(self.state, RoleState::ClusterHead(_)) {
                    debug!(node = self.id, src, records = records.len(), "aggregate received");
                    self.buffer.extend(records);
                } else {
                    trace!(node = self.id, src, "aggregate for a non-head, ignored");
                }
            }
            MessageKind::Relay { to, inner } => {
                trace!(node = self.id, src, to, kind = inner.name(), "relaying");
                self.transmit(&mut out, Target::Node(to), Message::new(src, *inner));
            }
        }
        out
    }

    fn on_head_announcement(&mut self, out: &mut Vec<Action>, head: NodeId, quality: f64) {
        match self.state {
            RoleState::Undefined(_) => {
                info!(node = self.id, round = self.round, head, "joined cluster");
                self.state = RoleState::Member(MemberState::new(head, quality));
                out.push(Action::Visual(Visual::NodeColor {
                    node: self.id,
                    color: Color::Member,
                }));
                self.send(out, Target::Broadcast, MessageKind::IAmClusterMember { head });
            }
            RoleState::Member(ref mut member) => member.record_head(head, quality),
            RoleState::ClusterHead(_) => {}
        }
    }

    fn on_member_announcement(&mut self, out: &mut Vec<Action>, member: NodeId, head: NodeId) {
        let id = self.id;
        match self.state {
            RoleState::ClusterHead(ref mut state) if head == id => {
                if state.cluster.members.insert(member) {
                    debug!(node = id, member, "member joined");
                    out.push(Action::Visual(Visual::Link {
                        from: member,
                        to: id,
                        style: LinkStyle::Membership,
                    }));
                }
            }
            RoleState::Undefined(ref mut candidate) if head != id && !candidate.closed => {
                candidate.neighbor_scores.remove(&member);
                let wins =
                    self.rule
                        .should_promote(id, candidate.score, &candidate.neighbor_scores);
                if wins {
                    self.promote(out, "remaining neighbors joined other clusters");
                }
            }
            _ => {}
        }
    }

    fn on_route_advertisement(
        &mut self,
        out: &mut Vec<Action>,
        upstream: NodeId,
        hop_count: u32,
        accumulated_quality: f64,
        visited_path: &[NodeId],
        link_quality: f64,
    ) {
        let id = self.id;
        let RoleState::ClusterHead(head) = &mut self.state else {
            return;
        };
        let offer = head.routes.offer(
            id,
            upstream,
            hop_count,
            accumulated_quality,
            visited_path,
            link_quality,
        );
        match offer {
            Offer::Loop => {
                debug!(node = id, upstream, "route advertisement loops back, rejected");
            }
            Offer::NotBetter => {
                trace!(node = id, upstream, "route advertisement not better, rejected");
            }
            Offer::Infeasible => {
                trace!(node = id, upstream, hop_count, "route longer than current best, rejected");
            }
            Offer::Recorded {
                improved_best: false,
            } => {
                trace!(node = id, upstream, "alternate route recorded");
            }
            Offer::Recorded {
                improved_best: true,
            } => {
                let Some(best) = head.routes.best().cloned() else {
                    return;
                };
                let adjacency = &head.cluster.adjacency;
                let relays: Vec<(NodeId, NodeId, f64)> = adjacency
                    .adjacent_heads()
                    .filter(|adjacent| !best.path.contains(adjacent))
                    .filter_map(|adjacent| {
                        adjacency
                            .best_gateway(adjacent)
                            .map(|g| (adjacent, g.member, g.local_quality))
                    })
                    .collect();
                debug!(
                    node = id,
                    upstream = best.upstream,
                    hops = best.hops,
                    quality = best.quality,
                    reflood = relays.len(),
                    "best route to sink improved"
                );
                out.push(Action::Visual(Visual::Link {
                    from: id,
                    to: best.upstream,
                    style: LinkStyle::Route,
                }));
                for (adjacent, gateway, local_quality) in relays {
                    let inner = Box::new(MessageKind::RouteToSink {
                        hop_count: best.hops,
                        accumulated_quality: best.quality + local_quality,
                        visited_path: best.path.clone(),
                    });
                    self.send(out, Target::Node(gateway), MessageKind::Relay { to: adjacent, inner });
                }
            }
        }
    }
}

impl<R: ElectionRule, E: EnergyModel> StateMachine for Node<R, E> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn reset(&mut self, recharge: bool) {
        self.state = RoleState::Undefined(Candidate::default());
        self.neighbors.clear();
        if recharge {
            self.battery.recharge(self.config.initial_energy);
        }
    }

    fn handle(&mut self, input: NodeInput) -> Vec<Action> {
        match input {
            NodeInput::RoundStart { round, neighbors } => self.begin_round(round, neighbors),
            NodeInput::Timer(timer) => self.on_timer(timer),
        }
    }

    fn drain_inbox(&mut self) -> Vec<Action> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.inbox.try_recv() {
            out.extend(self.on_message(envelope));
        }
        out
    }
}
