//! Typed message model shared by every routing component.

use crate::topology::{Advertisement, NeighborCosts};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Destination used by link-state advertisements
pub const BROADCAST_ADDRESS: &str = "all";

/// Prefix of advertisement message ids (`ls_<origin>_<sequence>`)
const ADVERTISEMENT_ID_PREFIX: &str = "ls_";

/// Opaque, globally unique node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Create a node address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Borrow the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

impl From<String> for NodeAddress {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

impl Borrow<str> for NodeAddress {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Message identity used for flood deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an id received from the wire
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for data and echo messages
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Id of the `sequence`-th advertisement from `origin`
    pub fn advertisement(origin: &NodeAddress, sequence: u64) -> Self {
        Self(format!("{ADVERTISEMENT_ID_PREFIX}{origin}_{sequence}"))
    }

    /// Id derived from addressing and payload, for peers that send none
    pub fn derived(from: &str, to: &str, payload: &str) -> Self {
        Self(format!("{from}_{to}_{payload}"))
    }

    /// Sequence number embedded in an advertisement id from `origin`
    pub fn advertisement_sequence(&self, origin: &NodeAddress) -> Option<u64> {
        let rest = self.0.strip_prefix(ADVERTISEMENT_ID_PREFIX)?;
        match rest.strip_prefix(origin.as_str()) {
            Some(tail) => tail.strip_prefix('_')?.parse().ok(),
            None => rest.rsplit_once('_')?.1.parse().ok(),
        }
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message kind, as carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Link-state advertisement
    Info,
    /// Round-trip probe
    Echo,
    /// Application data
    Data,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Info => write!(f, "info"),
            MessageKind::Echo => write!(f, "echo"),
            MessageKind::Data => write!(f, "data"),
        }
    }
}

/// Echo probe body
#[derive(Debug, Clone, PartialEq)]
pub struct EchoBody {
    /// Origination time in unix seconds
    pub sent_at: f64,
}

/// Application data body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBody {
    /// Application-defined `type` string (e.g. "message")
    pub kind: String,
    /// Opaque payload
    pub payload: String,
}

/// Kind-specific part of a message
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Link-state advertisement for `Message::from`
    Info(Advertisement),
    /// Round-trip probe
    Echo(EchoBody),
    /// Application data
    Data(DataBody),
}

/// A decoded mesh message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Identity for deduplication
    pub id: MessageId,
    /// Originating node
    pub from: NodeAddress,
    /// Destination node
    pub to: NodeAddress,
    /// Number of nodes that have forwarded this message
    pub hops: u32,
    /// Nodes this message has passed through, in order
    pub path: Vec<NodeAddress>,
    /// Kind-specific content
    pub body: Body,
}

impl Message {
    /// Create a fresh data message with an empty path
    pub fn data(
        from: NodeAddress,
        to: NodeAddress,
        kind: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::random(),
            from,
            to,
            hops: 0,
            path: Vec::new(),
            body: Body::Data(DataBody {
                kind: kind.into(),
                payload: payload.into(),
            }),
        }
    }

    /// Create an echo probe stamped with the current wall-clock time
    pub fn echo(from: NodeAddress, to: NodeAddress) -> Self {
        Self {
            id: MessageId::random(),
            from,
            to,
            hops: 0,
            path: Vec::new(),
            body: Body::Echo(EchoBody {
                sent_at: unix_now_secs(),
            }),
        }
    }

    /// Create the `sequence`-th link-state advertisement of `origin`
    pub fn advertisement(origin: NodeAddress, sequence: u64, costs: NeighborCosts) -> Self {
        Self {
            id: MessageId::advertisement(&origin, sequence),
            from: origin,
            to: NodeAddress::from(BROADCAST_ADDRESS),
            hops: 0,
            path: Vec::new(),
            body: Body::Info(Advertisement::new(sequence, costs)),
        }
    }

    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        match self.body {
            Body::Info(_) => MessageKind::Info,
            Body::Echo(_) => MessageKind::Echo,
            Body::Data(_) => MessageKind::Data,
        }
    }

    /// Whether `addr` already appears in the path trace
    pub fn has_visited(&self, addr: &NodeAddress) -> bool {
        self.path.iter().any(|via| via == addr)
    }

    /// Record that `local` is forwarding this message
    pub fn record_hop(&mut self, local: &NodeAddress) {
        self.hops = self.hops.saturating_add(1);
        self.path.push(local.clone());
    }

    /// Path trace rendered as `a -> b -> c`
    pub fn path_display(&self) -> String {
        self.path
            .iter()
            .map(NodeAddress::as_str)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Current wall-clock time in unix seconds
pub fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
