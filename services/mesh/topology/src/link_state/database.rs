//! TopologyDatabase implementation methods.

use super::{ComputedRoute, LinkStateRecord, TopologyDatabase, UpdateOutcome};
use mesh_wire::{Advertisement, Cost, NeighborCosts, NodeAddress};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info};

impl TopologyDatabase {
    /// Create a new topology database seeded with the local cost table
    pub fn new(local_address: NodeAddress, local_costs: NeighborCosts) -> Self {
        Self {
            local: LinkStateRecord {
                origin: local_address.clone(),
                sequence: 0,
                neighbor_costs: local_costs,
                last_updated: Instant::now(),
            },
            local_address,
            remote: HashMap::new(),
            local_sequence: 1,
        }
    }

    /// Local node address
    pub fn local_address(&self) -> &NodeAddress {
        &self.local_address
    }

    /// Get the next sequence number for local advertisements
    pub fn next_sequence_number(&mut self) -> u64 {
        let seq = self.local_sequence;
        self.local_sequence = self.local_sequence.wrapping_add(1);
        seq
    }

    /// Local cost table as currently stored
    pub fn local_costs(&self) -> &NeighborCosts {
        &self.local.neighbor_costs
    }

    /// Replace the local cost table (when configured neighbors change)
    pub fn set_local_costs(&mut self, costs: NeighborCosts) -> UpdateOutcome {
        self.local.last_updated = Instant::now();
        if self.local.neighbor_costs == costs {
            return UpdateOutcome::Unchanged;
        }
        self.local.neighbor_costs = costs;
        info!(
            "Local cost table updated ({} neighbors)",
            self.local.neighbor_costs.len()
        );
        UpdateOutcome::Changed
    }

    /// Build the next advertisement of the local record
    pub fn local_advertisement(&mut self) -> Advertisement {
        let sequence = self.next_sequence_number();
        self.local.sequence = sequence;
        self.local.last_updated = Instant::now();
        Advertisement::new(sequence, self.local.neighbor_costs.clone())
    }

    /// Process a received advertisement, replacing the origin's record wholesale
    pub fn update(
        &mut self,
        origin: &NodeAddress,
        sequence: u64,
        costs: NeighborCosts,
    ) -> UpdateOutcome {
        if *origin == self.local_address {
            debug!("Ignoring advertisement claiming local origin {}", origin);
            return UpdateOutcome::LocalOrigin;
        }

        let now = Instant::now();
        let outcome = match self.remote.get(origin) {
            Some(existing) => {
                let incoming = Advertisement::new(sequence, NeighborCosts::new());
                if existing.sequence != sequence && !incoming.is_newer_than(existing.sequence) {
                    debug!(
                        "Ignoring old advertisement from {} (seq: {} vs {})",
                        origin, sequence, existing.sequence
                    );
                    return UpdateOutcome::Stale;
                }
                if existing.neighbor_costs == costs {
                    UpdateOutcome::Unchanged
                } else {
                    UpdateOutcome::Changed
                }
            }
            None => UpdateOutcome::Changed,
        };

        if outcome.changed_graph() {
            info!(
                "Link state of {} replaced (seq: {}, {} neighbors)",
                origin,
                sequence,
                costs.len()
            );
        }

        self.remote.insert(
            origin.clone(),
            LinkStateRecord {
                origin: origin.clone(),
                sequence,
                neighbor_costs: costs,
                last_updated: now,
            },
        );

        outcome
    }

    /// Compute shortest paths from the local node using Dijkstra's algorithm
    ///
    /// Edge `u -> v` with weight `costs[v]` exists wherever `u`'s record lists
    /// `v`. Unreachable nodes are absent from the result.
    pub fn compute_routes(&self) -> HashMap<NodeAddress, ComputedRoute> {
        let local = &self.local_address;
        let mut distances: HashMap<&NodeAddress, Cost> = HashMap::new();
        let mut previous: HashMap<&NodeAddress, &NodeAddress> = HashMap::new();
        let mut unvisited: BinaryHeap<Reverse<(Cost, &NodeAddress)>> = BinaryHeap::new();

        distances.insert(local, Cost::ZERO);
        unvisited.push(Reverse((Cost::ZERO, local)));

        while let Some(Reverse((current_dist, current_node))) = unvisited.pop() {
            // Skip if we've already found a better path
            if current_dist > distances.get(current_node).copied().unwrap_or(Cost::MAX) {
                continue;
            }

            let Some(record) = self.get(current_node) else {
                continue;
            };

            for (neighbor, &cost) in &record.neighbor_costs {
                let new_dist = current_dist.saturating_add(cost);
                let existing_dist = distances.get(neighbor).copied().unwrap_or(Cost::MAX);

                if new_dist < existing_dist {
                    distances.insert(neighbor, new_dist);
                    previous.insert(neighbor, current_node);
                    unvisited.push(Reverse((new_dist, neighbor)));
                }
            }
        }

        let mut routes = HashMap::with_capacity(distances.len());
        for (&dst_node, &total_cost) in &distances {
            if dst_node == local {
                continue;
            }

            // Walk back from the destination until the predecessor is local
            let mut next_hop = dst_node;
            let mut hop_count = 1;
            while let Some(&prev_node) = previous.get(next_hop) {
                if prev_node == local {
                    break;
                }
                next_hop = prev_node;
                hop_count += 1;
            }

            routes.insert(
                dst_node.clone(),
                ComputedRoute {
                    dst_node: dst_node.clone(),
                    next_hop: next_hop.clone(),
                    total_cost,
                    hop_count,
                },
            );
        }

        debug!("Computed {} routes from node {}", routes.len(), local);
        routes
    }

    /// Get the record advertised by `origin`
    pub fn get(&self, origin: &NodeAddress) -> Option<&LinkStateRecord> {
        if *origin == self.local_address {
            Some(&self.local)
        } else {
            self.remote.get(origin)
        }
    }

    /// Iterate over all known records, the local one first
    pub fn records(&self) -> impl Iterator<Item = &LinkStateRecord> {
        std::iter::once(&self.local).chain(self.remote.values())
    }

    /// Remove remote records not refreshed within `max_age` of `now`
    pub fn expire_older_than(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.remote.len();

        self.remote
            .retain(|_, record| now.saturating_duration_since(record.last_updated) <= max_age);

        let removed = before - self.remote.len();
        if removed > 0 {
            info!("Aged out {} stale link-state records", removed);
        }
        removed
    }

    /// Get topology statistics
    pub fn get_stats(&self) -> TopologyStats {
        TopologyStats {
            total_records: self.remote.len() + 1,
            total_links: self
                .records()
                .map(|record| record.neighbor_costs.len())
                .sum(),
            local_sequence: self.local_sequence,
        }
    }
}

/// Topology database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyStats {
    /// Total number of known origins, including the local node
    pub total_records: usize,
    /// Total number of advertised directed links
    pub total_links: usize,
    /// Next local sequence number
    pub local_sequence: u64,
}
