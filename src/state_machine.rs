use crate::types::{Action, Neighbor, NodeId};

/// Timers a station arms for itself within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKind {
    /// Neighbor-score collection window closed.
    ElectionWindow,
    /// Start of the steady phase.
    SteadyPhase,
    /// Start of inter-cluster route construction.
    RouteSetup,
    /// Parent-selection collection window closed.
    ParentDecision,
    /// A member's `k`-th reading is due.
    DataTick(u32),
    /// A head's `k`-th forwarding tick.
    ForwardTick(u32),
}

/// Inputs delivered by the scheduler, apart from messages which arrive through the inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeInput {
    /// A new round began; `neighbors` are the sensors currently in range.
    RoundStart { round: u64, neighbors: Vec<Neighbor> },
    Timer(TimerKind),
}

/// Trait for stations driven by the discrete-event scheduler.
///
/// A station never touches another station's state: everything it wants to
/// happen elsewhere is returned as [`Action`]s for the scheduler to carry out.
pub trait StateMachine: Send {
    fn id(&self) -> NodeId;

    /// Drops all per-round state; `recharge` restores initial energy.
    fn reset(&mut self, recharge: bool);

    /// Handles a scheduler input.
    fn handle(&mut self, input: NodeInput) -> Vec<Action>;

    /// Processes every envelope waiting in the inbox, in arrival order.
    fn drain_inbox(&mut self) -> Vec<Action>;
}
