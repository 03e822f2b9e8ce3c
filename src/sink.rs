//! The sink: root of the routing tree and final consumer of aggregates.

use crate::config::{ProtocolConfig, RoutingStrategy};
use crate::state_machine::{NodeInput, StateMachine, TimerKind};
use crate::types::{Action, Color, Envelope, Message, MessageKind, NodeId, Record, Target, Visual};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, trace};

/// Mains-powered base station; transmissions cost it nothing.
pub struct Sink {
    id: NodeId,
    config: Arc<ProtocolConfig>,
    round: u64,
    /// Records received this round, in arrival order.
    delivered: Vec<Record>,
    /// Records received since the simulation began.
    total_delivered: u64,
    inbox: UnboundedReceiver<Envelope>,
}

impl Sink {
    pub fn new(id: NodeId, config: Arc<ProtocolConfig>) -> (Self, UnboundedSender<Envelope>) {
        let (sender, inbox) = mpsc::unbounded_channel();
        (
            Self {
                id,
                config,
                round: 0,
                delivered: Vec::new(),
                total_delivered: 0,
                inbox,
            },
            sender,
        )
    }

    pub fn delivered(&self) -> &[Record] {
        &self.delivered
    }

    pub fn total_delivered(&self) -> u64 {
        self.total_delivered
    }

    fn accept(&mut self, from: NodeId, source: NodeId, records: Vec<Record>) {
        for record in records {
            info!(
                round = self.round,
                via = from,
                head = source,
                record = %record,
                "sink received"
            );
            self.total_delivered += 1;
            self.delivered.push(record);
        }
    }
}

impl StateMachine for Sink {
    fn id(&self) -> NodeId {
        self.id
    }

    fn reset(&mut self, _recharge: bool) {
        self.delivered.clear();
    }

    fn handle(&mut self, input: NodeInput) -> Vec<Action> {
        let mut out = Vec::new();
        match input {
            NodeInput::RoundStart { round, .. } => {
                self.round = round;
                out.push(Action::Visual(Visual::NodeColor {
                    node: self.id,
                    color: Color::Sink,
                }));
                if self.config.routing == RoutingStrategy::Flood {
                    out.push(Action::SetTimer {
                        timer: TimerKind::RouteSetup,
                        delay: self.config.steady_offset() + self.config.route_setup_delay(),
                    });
                }
            }
            NodeInput::Timer(TimerKind::RouteSetup) => {
                info!(round = self.round, "sink flooding route advertisement");
                out.push(Action::Send {
                    target: Target::Broadcast,
                    message: Message::new(
                        self.id,
                        MessageKind::RouteToSink {
                            hop_count: 0,
                            accumulated_quality: 0.0,
                            visited_path: Vec::new(),
                        },
                    ),
                    delay: self.config.broadcast_delay(),
                });
            }
            NodeInput::Timer(_) => {}
        }
        out
    }

    fn drain_inbox(&mut self) -> Vec<Action> {
        while let Ok(envelope) = self.inbox.try_recv() {
            let Message { source, kind } = envelope.message;
            match kind {
                MessageKind::DataCombine { records, .. } => {
                    self.accept(envelope.from, source, records)
                }
                MessageKind::Data { seq, payload } => {
                    let record = Record {
                        round: self.round,
                        source,
                        seq,
                        payload,
                    };
                    self.accept(envelope.from, source, vec![record]);
                }
                other => trace!(from = envelope.from, kind = other.name(), "sink ignored"),
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_scheduled_only_for_flood_routing() {
        let (mut sink, _tx) = Sink::new(9, Arc::new(ProtocolConfig::default()));
        let actions = sink.handle(NodeInput::RoundStart {
            round: 1,
            neighbors: Vec::new(),
        });
        assert!(actions.contains(&Action::SetTimer {
            timer: TimerKind::RouteSetup,
            delay: std::time::Duration::from_millis(1500),
        }));

        let config = ProtocolConfig {
            routing: RoutingStrategy::ParentSelection,
            ..Default::default()
        };
        let (mut sink, _tx) = Sink::new(9, Arc::new(config));
        let actions = sink.handle(NodeInput::RoundStart {
            round: 1,
            neighbors: Vec::new(),
        });
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::SetTimer { .. })));
    }

    #[test]
    fn test_collects_aggregates() {
        let (mut sink, tx) = Sink::new(9, Arc::new(ProtocolConfig::default()));
        let records = vec![
            Record {
                round: 0,
                source: 1,
                seq: 0,
                payload: "a".into(),
            },
            Record {
                round: 0,
                source: 2,
                seq: 0,
                payload: "b".into(),
            },
        ];
        tx.send(Envelope {
            from: 3,
            message: Message::new(3, MessageKind::DataCombine { seq: 0, records }),
            distance: 5.0,
            quality: 1.0,
        })
        .unwrap();
        tx.send(Envelope {
            from: 3,
            message: Message::new(3, MessageKind::IAmClusterHead),
            distance: 5.0,
            quality: 1.0,
        })
        .unwrap();
        assert!(sink.drain_inbox().is_empty());
        assert_eq!(sink.delivered().len(), 2);
        assert_eq!(sink.total_delivered(), 2);
        sink.reset(false);
        assert!(sink.delivered().is_empty());
        assert_eq!(sink.total_delivered(), 2);
    }
}
