//! Flood controller: id deduplication plus path-membership loop check.

use crate::error::NodeError;
use mesh_storage::Dedup;
use mesh_wire::{Message, NodeAddress};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of offering a message for flooding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodOutcome {
    /// The id was flooded before; nothing to do
    AlreadySeen,
    /// The local node already appears in the path; flood stops here
    LoopDetected,
    /// The message was stamped with the local hop and should go to these neighbors
    Forwarded(Vec<NodeAddress>),
}

/// Decides whether and where a broadcast-style message is re-sent
pub struct FloodController {
    local: NodeAddress,
    neighbors: Vec<NodeAddress>,
    dedup: Arc<dyn Dedup>,
}

impl FloodController {
    /// Create a controller for `local` flooding to `neighbors`
    pub fn new(local: NodeAddress, neighbors: Vec<NodeAddress>, dedup: Arc<dyn Dedup>) -> Self {
        Self {
            local,
            neighbors,
            dedup,
        }
    }

    /// Direct neighbors this controller floods to
    pub fn neighbors(&self) -> &[NodeAddress] {
        &self.neighbors
    }

    /// Offer `message`, received from `sender` (or originated locally when
    /// `None`). On [`FloodOutcome::Forwarded`] the message has been stamped
    /// with the local hop and is ready to encode.
    pub async fn offer(
        &self,
        message: &mut Message,
        sender: Option<&NodeAddress>,
    ) -> Result<FloodOutcome, NodeError> {
        if !self.dedup.check_and_mark(&message.id).await? {
            debug!("Already flooded message {}", message.id);
            return Ok(FloodOutcome::AlreadySeen);
        }

        if message.has_visited(&self.local) {
            info!(
                "Stopping flood of {}: node {} already in path {}",
                message.id,
                self.local,
                message.path_display()
            );
            return Ok(FloodOutcome::LoopDetected);
        }

        message.record_hop(&self.local);

        let targets: Vec<NodeAddress> = self
            .neighbors
            .iter()
            .filter(|neighbor| Some(*neighbor) != sender && !message.has_visited(neighbor))
            .cloned()
            .collect();

        debug!(
            "Flooding {} message {} to {} neighbors",
            message.kind(),
            message.id,
            targets.len()
        );
        Ok(FloodOutcome::Forwarded(targets))
    }
}
