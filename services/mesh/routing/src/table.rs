//! Routing table snapshots and their atomic publication

use crate::next_hop::NextHop;
use mesh_topology::ComputedRoute;
use mesh_wire::NodeAddress;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Immutable next-hop table, rebuilt in full after every topology change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    /// Publication counter; 0 for the table in place before the first computation
    epoch: u64,
    /// Destination -> next hop. The local node is never present.
    routes: HashMap<NodeAddress, NextHop>,
}

impl RoutingTable {
    /// Build a table from a fresh shortest-path computation
    pub fn from_computed(epoch: u64, computed: &HashMap<NodeAddress, ComputedRoute>) -> Self {
        let routes = computed
            .iter()
            .map(|(dst, route)| (dst.clone(), NextHop::from(route)))
            .collect();
        Self { epoch, routes }
    }

    /// Publication counter of this snapshot
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Next hop towards `dst`, if `dst` is reachable
    pub fn get(&self, dst: &NodeAddress) -> Option<&NextHop> {
        self.routes.get(dst)
    }

    /// Whether `dst` is reachable
    pub fn contains(&self, dst: &NodeAddress) -> bool {
        self.routes.contains_key(dst)
    }

    /// Number of reachable destinations
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no destination is reachable
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes ordered by destination
    pub fn sorted(&self) -> Vec<(&NodeAddress, &NextHop)> {
        let mut routes: Vec<_> = self.routes.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        routes
    }

    /// One line per destination, for logging
    pub fn render(&self) -> String {
        self.sorted()
            .into_iter()
            .map(|(dst, hop)| format!("{dst} {hop}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Write side of the published routing table. Owned by the node's event loop.
#[derive(Debug)]
pub struct RoutePublisher {
    tx: watch::Sender<Arc<RoutingTable>>,
    epoch: u64,
}

impl RoutePublisher {
    /// Create a publisher holding an empty table, plus a first reader
    pub fn new() -> (Self, RouteReader) {
        let (tx, rx) = watch::channel(Arc::new(RoutingTable::default()));
        (Self { tx, epoch: 0 }, RouteReader { rx })
    }

    /// Replace the published table with one built from `computed`
    pub fn publish(&mut self, computed: &HashMap<NodeAddress, ComputedRoute>) -> Arc<RoutingTable> {
        self.epoch = self.epoch.wrapping_add(1);
        let table = Arc::new(RoutingTable::from_computed(self.epoch, computed));

        let previous = self.tx.send_replace(Arc::clone(&table));
        if previous.routes != table.routes {
            info!(
                "Routing table updated to epoch {} with {} routes",
                table.epoch,
                table.len()
            );
        } else {
            debug!("Routing table epoch {} unchanged in content", table.epoch);
        }
        table
    }

    /// The table currently published
    pub fn current(&self) -> Arc<RoutingTable> {
        Arc::clone(&self.tx.borrow())
    }

    /// Another reader of the published table
    pub fn reader(&self) -> RouteReader {
        RouteReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the published routing table
#[derive(Debug, Clone)]
pub struct RouteReader {
    rx: watch::Receiver<Arc<RoutingTable>>,
}

impl RouteReader {
    /// The table most recently published
    pub fn snapshot(&self) -> Arc<RoutingTable> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next publication. Returns false once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
