use crate::state_machine::TimerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a sensor node or the sink.
pub type NodeId = usize;

/// Planar position of a station.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Role a sensor holds within one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Election still running.
    #[default]
    Undefined,
    /// Joined the cluster of an official head.
    Member,
    /// Leads a cluster and relays toward the sink.
    ClusterHead,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Undefined => write!(f, "undefined"),
            Role::Member => write!(f, "member"),
            Role::ClusterHead => write!(f, "cluster-head"),
        }
    }
}

/// A sensor within range, as reported by the medium once per round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: NodeId,
    pub distance: f64,
    pub quality: f64,
}

/// A cluster head heard by a member, with the link quality measured on its announcement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeardHead {
    pub id: NodeId,
    pub quality: f64,
}

/// One sensor reading travelling toward the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Round in which a head first buffered the reading.
    pub round: u64,
    /// Member that produced the reading.
    pub source: NodeId,
    /// Per-round sequence number at the source.
    pub seq: u32,
    pub payload: String,
}

impl Record {
    pub fn key(&self) -> (u64, NodeId, u32) {
        (self.round, self.source, self.seq)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source {}: seq {}: {}", self.source, self.seq, self.payload)
    }
}

/// Protocol payloads exchanged between stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Election score of an undecided node.
    NodeResidual { score: f64 },

    /// Announces the cluster-head role.
    IAmClusterHead,

    /// Announces membership of `head`'s cluster.
    IAmClusterMember { head: NodeId },

    /// Heads a member has heard this round, used for gateway discovery.
    MyClusterHeads { heads: Vec<HeardHead>, residual: f64 },

    /// Parent-selection value exchanged between adjacent heads.
    ClusterHeadResidual { psv: f64 },

    /// Route advertisement flooded outward from the sink.
    RouteToSink {
        hop_count: u32,
        accumulated_quality: f64,
        visited_path: Vec<NodeId>,
    },

    /// Raw reading from a member to its official head.
    Data { seq: u32, payload: String },

    /// Aggregated readings forwarded by a head.
    DataCombine { seq: u32, records: Vec<Record> },

    /// Inter-cluster traffic handed to a gateway for one more hop.
    Relay { to: NodeId, inner: Box<MessageKind> },
}

impl MessageKind {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::NodeResidual { .. } => "NodeResidual",
            MessageKind::IAmClusterHead => "IAmClusterHead",
            MessageKind::IAmClusterMember { .. } => "IAmClusterMember",
            MessageKind::MyClusterHeads { .. } => "MyClusterHeads",
            MessageKind::ClusterHeadResidual { .. } => "ClusterHeadResidual",
            MessageKind::RouteToSink { .. } => "RouteToSink",
            MessageKind::Data { .. } => "Data",
            MessageKind::DataCombine { .. } => "DataCombine",
            MessageKind::Relay { .. } => "Relay",
        }
    }
}

/// A message with its logical origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Logical source, kept unchanged across gateway relays.
    pub source: NodeId,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(source: NodeId, kind: MessageKind) -> Self {
        Self { source, kind }
    }
}

/// Addressing of an outbound transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Every station within the sender's range.
    Broadcast,
    /// A single station, delivered only when in range.
    Node(NodeId),
    /// Long-range uplink that always reaches the sink.
    Sink,
}

/// A message as received, stamped by the medium.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Physical sender of this hop.
    pub from: NodeId,
    pub message: Message,
    /// Distance between sender and receiver at send time.
    pub distance: f64,
    /// Link quality of this hop as seen by the receiver.
    pub quality: f64,
}

/// Colors used by the visualization hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Idle,
    Member,
    ClusterHead,
    Sink,
}

/// Link styles used by the visualization hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStyle {
    Membership,
    Gateway,
    Route,
}

/// Fire-and-forget drawing requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Visual {
    NodeColor { node: NodeId, color: Color },
    Link { from: NodeId, to: NodeId, style: LinkStyle },
    Circle { node: NodeId, radius: f64 },
}

/// Actions a station takes after handling an input.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Transmit after `delay`; energy was already drained.
    Send {
        target: Target,
        message: Message,
        delay: Duration,
    },

    /// Wake this station again after `delay`.
    SetTimer { timer: TimerKind, delay: Duration },

    /// Visualization hook.
    Visual(Visual),
}
