//! Link-state database and shortest-path computation for mesh.
//!
//! This crate holds every node's view of the network: one link-state record
//! per known origin, replaced wholesale when a fresher advertisement arrives,
//! and a Dijkstra pass that turns those records into next-hop routes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod link_state;

pub use link_state::*;
