use crate::types::NodeId;
use thiserror::Error;

/// Errors that can occur while building or driving a simulated network.
#[derive(Error, Debug)]
pub enum WsnError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An id does not name a station of this network.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A node's inbox was dropped while the simulation still delivered to it.
    #[error("mailbox of node {0} is closed")]
    MailboxClosed(NodeId),

    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
