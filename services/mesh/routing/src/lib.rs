//! Next-hop routing tables, atomic route publication and forwarding decisions for mesh.
//!
//! The routing table is an immutable snapshot rebuilt from scratch after
//! every link-state change. It is published through a watch channel so a
//! reader always sees either the previous or the new table, never a partial
//! one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod next_hop;
pub mod router;
pub mod table;

pub use next_hop::*;
pub use router::*;
pub use table::*;
