use crate::error::WsnError;
use crate::routing::Parent;
use crate::types::{NodeId, Record, Role};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters collected while driving the scheduler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    /// Events taken off the queue.
    pub events_processed: u64,
    /// Transmissions handed to the medium.
    pub messages_sent: u64,
    /// Envelopes placed in a receiver's inbox.
    pub messages_delivered: u64,
    /// Unicasts dropped because the receiver was out of range.
    pub messages_dropped_range: u64,
    /// Transmissions still in flight when a round was cut off.
    pub messages_discarded_reset: u64,
    pub timers_set: u64,
}

/// State of the network at the end of one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub round: u64,
    /// Role of every sensor.
    pub roles: BTreeMap<NodeId, Role>,
    /// Official head of every member.
    pub official_heads: BTreeMap<NodeId, NodeId>,
    /// Members of every head.
    pub members: BTreeMap<NodeId, Vec<NodeId>>,
    /// Gateways of every head, keyed by adjacent head.
    pub gateways: BTreeMap<NodeId, BTreeMap<NodeId, Vec<NodeId>>>,
    /// Upstream relay of every head that found one.
    pub parents: BTreeMap<NodeId, Parent>,
    /// Records the sink received this round.
    pub delivered: Vec<Record>,
    pub residual_energy: BTreeMap<NodeId, f64>,
    /// Cumulative counters up to the end of this round.
    pub stats: SimulationStats,
}

impl RoundReport {
    pub fn heads(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roles
            .iter()
            .filter(|(_, role)| **role == Role::ClusterHead)
            .map(|(id, _)| *id)
    }

    pub fn role_count(&self, role: Role) -> usize {
        self.roles.values().filter(|r| **r == role).count()
    }

    pub fn to_json(&self) -> Result<String, WsnError> {
        Ok(serde_json::to_string(self)?)
    }
}
