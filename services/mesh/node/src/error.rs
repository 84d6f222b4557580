//! Node engine errors

use crate::transport::TransportError;
use mesh_storage::StorageError;
use mesh_wire::WireError;
use thiserror::Error;

/// Errors raised by the node engine
#[derive(Error, Debug)]
pub enum NodeError {
    /// Message could not be encoded or decoded
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
    /// Dedup cache failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// Invalid node configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// The send queue has been closed
    #[error("Outbox closed")]
    OutboxClosed,
    /// The node event loop is no longer running
    #[error("Node stopped")]
    Stopped,
    /// A node task panicked or was aborted
    #[error("Task failed: {0}")]
    TaskFailed(String),
}
