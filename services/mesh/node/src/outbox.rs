//! Bounded send queue and the worker that drains it into the transport.
//!
//! The event loop never calls the transport directly. Every send is queued
//! here; when the queue is full the loop waits, which slows intake down to
//! what the transport can absorb.

use crate::error::NodeError;
use crate::failure_tracker::SendFailureTracker;
use crate::transport::Transport;
use bytes::Bytes;
use mesh_wire::{MessageId, NodeAddress};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One queued transmission
#[derive(Debug, Clone)]
pub struct OutboundSend {
    /// Neighbor (or probe target) to hand the bytes to
    pub to: NodeAddress,
    /// Encoded message
    pub bytes: Bytes,
    /// Id of the encoded message, for logging
    pub id: MessageId,
}

/// Producer side of the send queue
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboundSend>,
}

impl Outbox {
    /// Create a queue holding at most `capacity` pending sends
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundSend>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a send, waiting for room if the queue is full
    pub async fn enqueue(&self, send: OutboundSend) -> Result<(), NodeError> {
        self.tx.send(send).await.map_err(|_| NodeError::OutboxClosed)
    }
}

/// Counters kept by the send worker
#[derive(Debug, Default)]
pub struct SendStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl SendStats {
    /// Sends the transport accepted
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Sends the transport rejected
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Drains the send queue into the transport. Failed sends are logged and
/// counted, never retried.
pub struct SendWorker {
    transport: Arc<dyn Transport>,
    rx: mpsc::Receiver<OutboundSend>,
    failures: SendFailureTracker,
    stats: Arc<SendStats>,
}

impl SendWorker {
    /// Create a worker for `rx`
    pub fn new(
        transport: Arc<dyn Transport>,
        rx: mpsc::Receiver<OutboundSend>,
        failures: SendFailureTracker,
    ) -> Self {
        Self {
            transport,
            rx,
            failures,
            stats: Arc::new(SendStats::default()),
        }
    }

    /// Shared counters of this worker
    pub fn stats(&self) -> Arc<SendStats> {
        Arc::clone(&self.stats)
    }

    /// Run until every [`Outbox`] is dropped and the queue is empty
    pub async fn run(mut self) {
        let local = self.transport.local_address().clone();
        debug!("Send worker for {} started", local);

        while let Some(send) = self.rx.recv().await {
            self.transmit(send).await;
        }

        info!(
            "Send worker for {} stopped ({} sent, {} failed)",
            local,
            self.stats.sent(),
            self.stats.failed()
        );
    }

    async fn transmit(&self, send: OutboundSend) {
        match self.transport.send(&send.to, send.bytes).await {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                self.failures.record_success(&send.to).await;
                debug!("Sent message {} to {}", send.id, send.to);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                let (count, _) = self.failures.record_failure(&send.to).await;
                warn!(
                    "Failed to send message {} to {}: {} ({} consecutive)",
                    send.id, send.to, e, count
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InboundSink, MemoryHub};
    use std::time::Duration;

    #[tokio::test]
    async fn test_worker_sends_and_counts_failures() {
        let hub = MemoryHub::new();
        let (tx, mut inbound) = mpsc::channel(8);
        hub.transport(NodeAddress::from("b"))
            .start(InboundSink::new(tx))
            .await
            .unwrap();

        let transport: Arc<dyn Transport> = Arc::new(hub.transport(NodeAddress::from("a")));
        let failures = SendFailureTracker::new(1, Duration::from_secs(30));
        let (outbox, rx) = Outbox::channel(4);
        let worker = SendWorker::new(transport, rx, failures.clone());
        let stats = worker.stats();
        let task = tokio::spawn(worker.run());

        for to in ["b", "ghost"] {
            outbox
                .enqueue(OutboundSend {
                    to: NodeAddress::from(to),
                    bytes: Bytes::from_static(b"{}"),
                    id: MessageId::new("m-1"),
                })
                .await
                .unwrap();
        }
        drop(outbox);
        task.await.unwrap();

        assert_eq!(inbound.recv().await.unwrap().from, NodeAddress::from("a"));
        assert_eq!(stats.sent(), 1);
        assert_eq!(stats.failed(), 1);
        assert!(failures.is_unreachable(&NodeAddress::from("ghost")).await);
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_gone() {
        let (outbox, rx) = Outbox::channel(1);
        drop(rx);

        let result = outbox
            .enqueue(OutboundSend {
                to: NodeAddress::from("b"),
                bytes: Bytes::new(),
                id: MessageId::new("m-1"),
            })
            .await;
        assert!(matches!(result, Err(NodeError::OutboxClosed)));
    }
}
