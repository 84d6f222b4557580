//! Next hop definitions

use mesh_topology::ComputedRoute;
use mesh_wire::{Cost, NodeAddress};
use std::fmt;

/// A next hop for routing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NextHop {
    /// Neighbor to hand the message to
    pub node_id: NodeAddress,
    /// Total cost of the path through this neighbor
    pub cost: Cost,
    /// Number of links on that path
    pub hop_count: u32,
}

impl NextHop {
    /// Create a new next hop
    pub fn new(node_id: NodeAddress, cost: Cost, hop_count: u32) -> Self {
        Self {
            node_id,
            cost,
            hop_count,
        }
    }
}

impl From<&ComputedRoute> for NextHop {
    fn from(route: &ComputedRoute) -> Self {
        Self::new(route.next_hop.clone(), route.total_cost, route.hop_count)
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "via {} (cost {}, {} hops)", self.node_id, self.cost, self.hop_count)
    }
}
