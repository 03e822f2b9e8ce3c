//! Event queue with deterministic ordering.

use crate::state_machine::{NodeInput, TimerKind};
use crate::types::{Envelope, NodeId};
use std::cmp::Ordering;
use std::time::Duration;

/// Priority of events scheduled for the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Round start.
    Control,
    /// Timer expiry.
    Timer,
    /// Message delivery.
    Delivery,
}

/// Something a station must handle at a given simulated time.
#[derive(Debug, Clone)]
pub enum Event {
    Input(NodeInput),
    Deliver(Envelope),
}

impl Event {
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::Input(NodeInput::RoundStart { .. }) => EventPriority::Control,
            Event::Input(NodeInput::Timer(_)) => EventPriority::Timer,
            Event::Deliver(_) => EventPriority::Delivery,
        }
    }

    pub fn timer(timer: TimerKind) -> Self {
        Event::Input(NodeInput::Timer(timer))
    }
}

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Priority (control before timers before deliveries)
/// 3. Station id (deterministic ordering)
/// 4. Sequence number (FIFO for same time/priority/station)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub node: NodeId,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &Event, node: NodeId, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            node,
            sequence,
        }
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then(self.priority.cmp(&other.priority))
            .then(self.node.cmp(&other.node))
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
