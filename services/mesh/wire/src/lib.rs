//! Wire message model and JSON codec for the link-state mesh.
//!
//! Every message exchanged between nodes is a single self-describing JSON
//! object. The codec decodes it once at the transport boundary into a typed
//! [`Message`] whose [`Body`] carries only the fields relevant to its kind.
//!
//! ## Wire Format
//!
//! ```text
//! {
//!   "id":       string,                 message identity (dedup key)
//!   "type":     "info" | "echo" | ...,  anything else is application data
//!   "from":     string,                 originating node
//!   "to":       string,                 destination node ("all" for info)
//!   "hops":     uint,                   nodes traversed so far
//!   "headers":  [ {"via": string} ],    path trace
//!   "payload":  string,                 cost map JSON | unix seconds | opaque
//!   "sequence": uint                    optional, advertisements only
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod message;
pub mod topology;

// Re-export main types
pub use codec::{decode, encode};
pub use error::WireError;
pub use message::{
    unix_now_secs, Body, DataBody, EchoBody, Message, MessageId, MessageKind, NodeAddress,
    BROADCAST_ADDRESS,
};
pub use topology::{Advertisement, Cost, InvalidCost, NeighborCosts};
