//! Transport seam between the routing engine and the messaging substrate.
//!
//! The engine consumes two primitives: [`Transport::send`] towards a peer
//! address, and inbound delivery through the [`InboundSink`] handed to the
//! transport when the node starts. [`MemoryHub`] connects any number of
//! in-process nodes.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use mesh_wire::NodeAddress;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Destination is not attached to the transport
    #[error("unknown peer {0}")]
    UnknownPeer(NodeAddress),
    /// Destination stopped receiving
    #[error("peer {0} is closed")]
    Closed(NodeAddress),
    /// Destination cannot accept more messages right now
    #[error("peer {0} is not keeping up")]
    Backpressure(NodeAddress),
    /// The transport was already started
    #[error("transport for {0} already started")]
    AlreadyStarted(NodeAddress),
}

/// Raw message received from a peer
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Address of the peer that handed us the bytes
    pub from: NodeAddress,
    /// Encoded message
    pub bytes: Bytes,
}

/// Receive callback handed to a transport
#[derive(Debug, Clone)]
pub struct InboundSink {
    tx: mpsc::Sender<Inbound>,
}

impl InboundSink {
    /// Create a sink feeding `tx`
    pub fn new(tx: mpsc::Sender<Inbound>) -> Self {
        Self { tx }
    }

    /// Hand received bytes to the node without waiting
    pub fn deliver(&self, from: NodeAddress, bytes: Bytes) -> Result<(), InboundRejected> {
        self.tx
            .try_send(Inbound { from, bytes })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => InboundRejected::Full,
                mpsc::error::TrySendError::Closed(_) => InboundRejected::Closed,
            })
    }

    /// Whether the node behind this sink has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Why a sink refused a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundRejected {
    /// Inbound queue is full
    Full,
    /// Node has stopped
    Closed,
}

/// Point-to-point messaging substrate
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address this transport sends from
    fn local_address(&self) -> &NodeAddress;

    /// Register the receive callback. Called once when the node starts.
    async fn start(&self, sink: InboundSink) -> Result<(), TransportError>;

    /// Send encoded bytes to `to`
    async fn send(&self, to: &NodeAddress, bytes: Bytes) -> Result<(), TransportError>;
}

/// In-process switchboard connecting [`MemoryTransport`]s by address
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    peers: Arc<DashMap<NodeAddress, InboundSink>>,
}

impl MemoryHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for `address` on this hub
    pub fn transport(&self, address: NodeAddress) -> MemoryTransport {
        MemoryTransport {
            local: address,
            hub: self.clone(),
        }
    }

    /// Detach `address`; later sends to it fail with [`TransportError::UnknownPeer`]
    pub fn disconnect(&self, address: &NodeAddress) -> bool {
        let removed = self.peers.remove(address).is_some();
        if removed {
            info!("Disconnected {} from memory hub", address);
        }
        removed
    }

    /// Whether `address` is attached
    pub fn is_attached(&self, address: &NodeAddress) -> bool {
        self.peers.contains_key(address)
    }

    /// Number of attached peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peer is attached
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Transport over a [`MemoryHub`]
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    local: NodeAddress,
    hub: MemoryHub,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_address(&self) -> &NodeAddress {
        &self.local
    }

    async fn start(&self, sink: InboundSink) -> Result<(), TransportError> {
        let live = self
            .hub
            .peers
            .get(&self.local)
            .map(|existing| !existing.is_closed())
            .unwrap_or(false);
        if live {
            return Err(TransportError::AlreadyStarted(self.local.clone()));
        }
        self.hub.peers.insert(self.local.clone(), sink);
        debug!("Attached {} to memory hub", self.local);
        Ok(())
    }

    async fn send(&self, to: &NodeAddress, bytes: Bytes) -> Result<(), TransportError> {
        let sink = self
            .hub
            .peers
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;

        sink.deliver(self.local.clone(), bytes).map_err(|rejected| match rejected {
            InboundRejected::Full => TransportError::Backpressure(to.clone()),
            InboundRejected::Closed => TransportError::Closed(to.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_hub_delivery() {
        let hub = MemoryHub::new();
        let a = hub.transport(NodeAddress::from("a"));
        let b = hub.transport(NodeAddress::from("b"));

        let (tx, mut rx) = mpsc::channel(4);
        b.start(InboundSink::new(tx)).await.unwrap();

        a.send(&NodeAddress::from("b"), Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let inbound = rx.recv().await.unwrap();
        assert_eq!(inbound.from, NodeAddress::from("a"));
        assert_eq!(inbound.bytes, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_memory_hub_errors() {
        let hub = MemoryHub::new();
        let a = hub.transport(NodeAddress::from("a"));
        let b_addr = NodeAddress::from("b");

        assert_eq!(
            a.send(&b_addr, Bytes::new()).await,
            Err(TransportError::UnknownPeer(b_addr.clone()))
        );

        let (tx, rx) = mpsc::channel(1);
        hub.transport(b_addr.clone())
            .start(InboundSink::new(tx))
            .await
            .unwrap();
        a.send(&b_addr, Bytes::new()).await.unwrap();
        assert_eq!(
            a.send(&b_addr, Bytes::new()).await,
            Err(TransportError::Backpressure(b_addr.clone()))
        );

        drop(rx);
        assert_eq!(
            a.send(&b_addr, Bytes::new()).await,
            Err(TransportError::Closed(b_addr.clone()))
        );

        assert!(hub.disconnect(&b_addr));
        assert!(!hub.is_attached(&b_addr));
    }

    #[tokio::test]
    async fn test_memory_transport_starts_once() {
        let hub = MemoryHub::new();
        let a = hub.transport(NodeAddress::from("a"));

        let (tx, _rx) = mpsc::channel(1);
        a.start(InboundSink::new(tx.clone())).await.unwrap();
        assert!(matches!(
            a.start(InboundSink::new(tx)).await,
            Err(TransportError::AlreadyStarted(_))
        ));
    }
}
