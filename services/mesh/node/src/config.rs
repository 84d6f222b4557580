//! Construction-time node configuration

use crate::error::NodeError;
use crate::scheduler::SchedulerConfig;
use mesh_routing::RoutingMode;
use mesh_storage::DedupConfig;
use mesh_wire::{NeighborCosts, NodeAddress, BROADCAST_ADDRESS};

/// Default bound on queued outbound sends
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;
/// Default bound on received messages awaiting processing
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Everything a node needs to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address of this node
    pub local_address: NodeAddress,
    /// Direct neighbors and the cost of each link
    pub neighbor_costs: NeighborCosts,
    /// Data forwarding mode
    pub mode: RoutingMode,
    /// Discovery, announcement and aging timers
    pub scheduler: SchedulerConfig,
    /// Flood dedup cache tuning
    pub dedup: DedupConfig,
    /// Bound on queued outbound sends
    pub outbox_capacity: usize,
    /// Bound on received messages awaiting processing
    pub inbound_capacity: usize,
}

impl NodeConfig {
    /// Configuration with default timers and capacities
    pub fn new(local_address: NodeAddress, neighbor_costs: NeighborCosts, mode: RoutingMode) -> Self {
        Self {
            local_address,
            neighbor_costs,
            mode,
            scheduler: SchedulerConfig::default(),
            dedup: DedupConfig::default(),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }

    /// Direct neighbors in address order
    pub fn neighbors(&self) -> Vec<NodeAddress> {
        self.neighbor_costs.keys().cloned().collect()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.local_address.as_str().is_empty() {
            return Err(NodeError::InvalidConfig("local address is empty".to_string()));
        }
        if self.local_address.as_str() == BROADCAST_ADDRESS {
            return Err(NodeError::InvalidConfig(format!(
                "'{}' is reserved for advertisements",
                BROADCAST_ADDRESS
            )));
        }
        if self.neighbor_costs.contains_key(&self.local_address) {
            return Err(NodeError::InvalidConfig(format!(
                "{} lists itself as a neighbor",
                self.local_address
            )));
        }
        let timers = [
            ("announce_interval", self.scheduler.announce_interval),
            ("maintenance_interval", self.scheduler.maintenance_interval),
            ("record_max_age", self.scheduler.record_max_age),
        ];
        for (name, value) in timers {
            if value.is_zero() {
                return Err(NodeError::InvalidConfig(format!("{name} must be greater than zero")));
            }
        }
        if self.outbox_capacity == 0 || self.inbound_capacity == 0 {
            return Err(NodeError::InvalidConfig(
                "queue capacities must be greater than zero".to_string(),
            ));
        }
        self.dedup.validate()?;
        Ok(())
    }
}
