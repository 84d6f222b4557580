//! Router trait and routing decision logic

use crate::next_hop::NextHop;
use crate::table::RouteReader;
use mesh_wire::{NodeAddress, BROADCAST_ADDRESS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// How a node forwards data messages it is not the destination of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Shortest-path next hop from the link-state database
    #[default]
    #[serde(rename = "lsr")]
    LinkState,
    /// Forward to every neighbor not yet on the path
    Flooding,
}

/// Unknown routing mode name
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown routing mode '{0}', expected 'lsr' or 'flooding'")]
pub struct ParseModeError(String);

impl FromStr for RoutingMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lsr" | "link-state" | "linkstate" => Ok(RoutingMode::LinkState),
            "flooding" | "flood" => Ok(RoutingMode::Flooding),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::LinkState => write!(f, "lsr"),
            RoutingMode::Flooding => write!(f, "flooding"),
        }
    }
}

/// Routing decision result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Forward to next hop
    Forward(NextHop),
    /// Deliver locally (we are the destination)
    Local,
    /// Drop the message
    Drop(DropReason),
}

/// Reason for dropping a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// No route to destination
    NoRoute,
    /// Destination is the broadcast address, which has no unicast route
    InvalidDestination,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NoRoute => write!(f, "no route to destination"),
            DropReason::InvalidDestination => write!(f, "invalid destination"),
        }
    }
}

/// Router trait for making unicast forwarding decisions
pub trait Router: Send + Sync {
    /// Make a routing decision for a message addressed to `dst`
    fn decide(&self, dst: &NodeAddress) -> RoutingDecision;

    /// Get the local node address
    fn local_address(&self) -> &NodeAddress;

    /// Check if a destination is reachable
    fn is_reachable(&self, dst: &NodeAddress) -> bool;

    /// Get routing statistics
    fn get_stats(&self) -> RouterStats;
}

/// Router statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Total number of routes in the current table
    pub total_routes: usize,
    /// Epoch of the current table
    pub epoch: u64,
    /// Number of routing decisions made
    pub decisions_made: u64,
    /// Number of messages forwarded
    pub packets_forwarded: u64,
    /// Number of messages delivered locally
    pub packets_local: u64,
    /// Dropped for lack of a route
    pub dropped_no_route: u64,
    /// Dropped for an unroutable destination
    pub dropped_invalid: u64,
}

/// Router backed by the published link-state routing table
#[derive(Debug)]
pub struct LinkStateRouter {
    local: NodeAddress,
    routes: RouteReader,
    decisions_counter: AtomicU64,
    forwards_counter: AtomicU64,
    local_counter: AtomicU64,
    no_route_counter: AtomicU64,
    invalid_counter: AtomicU64,
}

impl LinkStateRouter {
    /// Create a router reading from `routes`
    pub fn new(local: NodeAddress, routes: RouteReader) -> Self {
        Self {
            local,
            routes,
            decisions_counter: AtomicU64::new(0),
            forwards_counter: AtomicU64::new(0),
            local_counter: AtomicU64::new(0),
            no_route_counter: AtomicU64::new(0),
            invalid_counter: AtomicU64::new(0),
        }
    }

    fn drop_with(&self, reason: DropReason) -> RoutingDecision {
        let counter = match reason {
            DropReason::NoRoute => &self.no_route_counter,
            DropReason::InvalidDestination => &self.invalid_counter,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        RoutingDecision::Drop(reason)
    }
}

impl Router for LinkStateRouter {
    fn decide(&self, dst: &NodeAddress) -> RoutingDecision {
        self.decisions_counter.fetch_add(1, Ordering::Relaxed);

        if *dst == self.local {
            self.local_counter.fetch_add(1, Ordering::Relaxed);
            return RoutingDecision::Local;
        }
        if dst.as_str() == BROADCAST_ADDRESS {
            return self.drop_with(DropReason::InvalidDestination);
        }

        let table = self.routes.snapshot();
        match table.get(dst) {
            Some(hop) => {
                debug!("Routing to {} {} (epoch {})", dst, hop, table.epoch());
                self.forwards_counter.fetch_add(1, Ordering::Relaxed);
                RoutingDecision::Forward(hop.clone())
            }
            None => self.drop_with(DropReason::NoRoute),
        }
    }

    fn local_address(&self) -> &NodeAddress {
        &self.local
    }

    fn is_reachable(&self, dst: &NodeAddress) -> bool {
        *dst == self.local || self.routes.snapshot().contains(dst)
    }

    fn get_stats(&self) -> RouterStats {
        let table = self.routes.snapshot();
        RouterStats {
            total_routes: table.len(),
            epoch: table.epoch(),
            decisions_made: self.decisions_counter.load(Ordering::Relaxed),
            packets_forwarded: self.forwards_counter.load(Ordering::Relaxed),
            packets_local: self.local_counter.load(Ordering::Relaxed),
            dropped_no_route: self.no_route_counter.load(Ordering::Relaxed),
            dropped_invalid: self.invalid_counter.load(Ordering::Relaxed),
        }
    }
}
