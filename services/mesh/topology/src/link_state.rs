//! Link-state topology database and shortest path computation.

use mesh_wire::{Cost, NeighborCosts, NodeAddress};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default maximum age of a remote record before it is aged out (5 minutes)
pub const DEFAULT_RECORD_MAX_AGE: Duration = Duration::from_secs(300);

/// Advertised topology fragment of one origin node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateRecord {
    /// Node that advertised these links
    pub origin: NodeAddress,
    /// Sequence number of the advertisement this record came from
    pub sequence: u64,
    /// Direct neighbors of the origin and the cost to reach each
    pub neighbor_costs: NeighborCosts,
    /// When this record was last replaced or refreshed
    pub last_updated: Instant,
}

/// Computed route information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedRoute {
    /// Destination node
    pub dst_node: NodeAddress,
    /// First node after the local node on the shortest path
    pub next_hop: NodeAddress,
    /// Total cost to reach destination
    pub total_cost: Cost,
    /// Number of links on the path
    pub hop_count: u32,
}

/// Result of feeding an advertisement to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Record inserted or its links changed
    Changed,
    /// Record refreshed with identical links
    Unchanged,
    /// Advertisement older than the stored record; ignored
    Stale,
    /// Advertisement claims to come from the local node; ignored
    LocalOrigin,
}

impl UpdateOutcome {
    /// Whether the stored graph now differs from before the update
    pub fn changed_graph(&self) -> bool {
        matches!(self, UpdateOutcome::Changed)
    }
}

/// Link-state topology database
#[derive(Debug)]
pub struct TopologyDatabase {
    /// Local node address
    local_address: NodeAddress,
    /// Record built from the local cost table
    local: LinkStateRecord,
    /// Records of every other known origin
    remote: HashMap<NodeAddress, LinkStateRecord>,
    /// Next sequence number for our own advertisements
    local_sequence: u64,
}

// Include implementation
mod database;
pub use database::TopologyStats;
