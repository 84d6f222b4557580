//! Per-node routing engine for mesh.
//!
//! A node knows only its direct neighbors and link costs. It floods
//! link-state advertisements, keeps the shortest-path next-hop table current
//! and forwards or floods application data over any [`Transport`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use mesh_node::{MemoryHub, NodeConfig, NodeEvent, NodeRuntime, Transport};
//! use mesh_routing::RoutingMode;
//! use mesh_wire::{Cost, NeighborCosts, NodeAddress};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), mesh_node::NodeError> {
//! let hub = MemoryHub::new();
//! let mut costs = NeighborCosts::new();
//! costs.insert(NodeAddress::from("b"), Cost::from(1));
//!
//! let config = NodeConfig::new(NodeAddress::from("a"), costs, RoutingMode::LinkState);
//! let transport: Arc<dyn Transport> = Arc::new(hub.transport(NodeAddress::from("a")));
//! let node = NodeRuntime::spawn(config, transport).await?;
//!
//! let mut events = node.events();
//! node.send(NodeAddress::from("b"), "message", "hello").await?;
//! while let Ok(event) = events.recv().await {
//!     if let NodeEvent::Undeliverable { to, .. } = event {
//!         println!("no route to {}", to);
//!     }
//! }
//! node.shutdown().await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod echo;
pub mod error;
pub mod failure_tracker;
pub mod flood;
pub mod node;
pub mod outbox;
pub mod runtime;
pub mod scheduler;
pub mod transport;

pub use config::NodeConfig;
pub use error::NodeError;
pub use failure_tracker::SendFailureTracker;
pub use flood::{FloodController, FloodOutcome};
pub use node::{MaintenanceReport, NodeEvent, RouterNode};
pub use outbox::{OutboundSend, Outbox, SendStats, SendWorker};
pub use runtime::{NodeHandle, NodeRuntime};
pub use scheduler::{Scheduler, SchedulerConfig, Tick};
pub use transport::{Inbound, InboundSink, MemoryHub, MemoryTransport, Transport, TransportError};
