//! wsn-cluster: a deterministic simulation of a self-organizing wireless sensor network.
//!
//! Sensors elect cluster heads by a residual-value score (residual energy times
//! aggregate link quality to the neighbors in range), form clusters around them,
//! discover gateway members bridging adjacent clusters, build a loop-free relay
//! tree toward a sink, and aggregate readings up that tree. Every round the
//! election runs again, so the head role rotates as energy drains.
//!
//! # Features
//! - Per-node protocol state machines driven only by timers and delivered messages.
//! - Pluggable election, energy and link-quality models behind traits.
//! - Two routing schemes: a sink-rooted route flood and a parent-selection exchange.
//! - A seeded discrete-event scheduler; identical seeds give identical reports.
//!
//! # Example
//! ```
//! use wsn_cluster::{jittered_grid, Network, SimConfig, WsnError};
//!
//! # async fn example() -> Result<(), WsnError> {
//! let config = SimConfig::default();
//! let positions = jittered_grid(6, 6, 60.0, 100.0, 40.0, config.seed);
//! let mut network = Network::new(config, positions)?;
//! let reports = network.simulate(3).await?;
//! assert_eq!(reports.len(), 3);
//! # Ok(())
//! # }
//! ```

mod cluster;
mod config;
mod data;
mod election;
mod energy;
mod error;
mod event_queue;
mod link;
mod medium;
mod network;
mod node;
mod report;
mod routing;
mod scene;
mod sink;
mod state_machine;
mod types;

pub use cluster::{Adjacency, Gateway, HeadState, MemberState};
pub use config::{
    NoiseSampling, ProtocolConfig, RadioConfig, RoundConfig, RouteMetric, RoutingStrategy,
    SimConfig, SinkConfig, TieBreak,
};
pub use data::{render, AggregationBuffer};
pub use election::{Candidate, ElectionRule, ResidualElection};
pub use energy::{Battery, EnergyModel, FixedCost};
pub use error::WsnError;
pub use event_queue::{Event, EventKey, EventPriority};
pub use link::{path_loss_quality, sample_gaussian, LinkQuality, LogDistance};
pub use medium::{jittered_grid, Medium, Transmission};
pub use network::Network;
pub use node::{HeadRole, Node, RoleState};
pub use report::{RoundReport, SimulationStats};
pub use routing::{
    compare_routes, parent_selection_value, Offer, Parent, PsvExchange, RouteEntry, RouteTable,
};
pub use scene::{RecordingScene, Scene, TraceScene};
pub use sink::Sink;
pub use state_machine::{NodeInput, StateMachine, TimerKind};
pub use types::{
    Action, Color, Envelope, HeardHead, LinkStyle, Message, MessageKind, Neighbor, NodeId,
    Position, Record, Role, Target, Visual,
};
