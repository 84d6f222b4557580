//! Node runtime: one cooperative event loop per node.
//!
//! The loop owns the [`RouterNode`] and multiplexes, with `tokio::select!`,
//! inbound messages, application commands, scheduler ticks and shutdown.
//! Sends leave through the outbox to a [`SendWorker`] task supervised by the
//! loop.

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::failure_tracker::SendFailureTracker;
use crate::node::{NodeEvent, RouterNode};
use crate::outbox::{Outbox, SendStats, SendWorker};
use crate::scheduler::{Scheduler, Tick};
use crate::transport::{Inbound, InboundSink, Transport};
use mesh_routing::RouteReader;
use mesh_storage::{Dedup, MemoryDedup};
use mesh_wire::{MessageId, NodeAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consecutive failed sends before a neighbor is reported unreachable
const SEND_FAILURE_THRESHOLD: u32 = 3;
/// Window for counting consecutive send failures
const SEND_FAILURE_WINDOW: Duration = Duration::from_secs(30);
/// Buffered application events per subscriber
const EVENT_CAPACITY: usize = 256;
/// Buffered application commands
const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, NodeError>>;

enum Command {
    Send {
        to: NodeAddress,
        kind: String,
        payload: String,
        reply: Reply<MessageId>,
    },
    Probe {
        target: NodeAddress,
        reply: Reply<MessageId>,
    },
    Announce {
        reply: Reply<MessageId>,
    },
}

/// Starts nodes
pub struct NodeRuntime;

impl NodeRuntime {
    /// Validate `config`, attach to `transport` and start the node's tasks
    pub async fn spawn(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<NodeHandle, NodeError> {
        config.validate()?;
        if *transport.local_address() != config.local_address {
            return Err(NodeError::InvalidConfig(format!(
                "transport is bound to {} but node is {}",
                transport.local_address(),
                config.local_address
            )));
        }

        let dedup: Arc<dyn Dedup> = Arc::new(MemoryDedup::new(config.dedup.clone())?);

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        transport.start(InboundSink::new(inbound_tx)).await?;

        let (outbox, outbox_rx) = Outbox::channel(config.outbox_capacity);
        let failures = SendFailureTracker::new(SEND_FAILURE_THRESHOLD, SEND_FAILURE_WINDOW);
        let worker = SendWorker::new(Arc::clone(&transport), outbox_rx, failures.clone());
        let send_stats = worker.stats();
        let worker_task = tokio::spawn(worker.run());

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let node = RouterNode::new(&config, dedup, outbox, events.clone());
        let routes = node.routes();
        let scheduler = Scheduler::new(&config.scheduler, config.mode);

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let event_loop = EventLoop {
            node,
            scheduler,
            inbound: inbound_rx,
            commands: commands_rx,
            shutdown: shutdown_rx,
            worker: worker_task,
            failures,
        };
        let task = tokio::spawn(event_loop.run());

        Ok(NodeHandle {
            local: config.local_address,
            commands: commands_tx,
            routes,
            events,
            send_stats,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

struct EventLoop {
    node: RouterNode,
    scheduler: Scheduler,
    inbound: mpsc::Receiver<Inbound>,
    commands: mpsc::Receiver<Command>,
    shutdown: oneshot::Receiver<()>,
    worker: JoinHandle<()>,
    failures: SendFailureTracker,
}

impl EventLoop {
    async fn run(mut self) -> Result<(), NodeError> {
        let local = self.node.local_address().clone();
        info!(
            "Node {} started ({} mode, {} neighbors)",
            local,
            self.node.mode(),
            self.node.neighbors().len()
        );

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown => {
                    info!("Node {} shutting down", local);
                    break Ok(());
                }

                joined = &mut self.worker => {
                    let reason = match joined {
                        Ok(()) => "exited".to_string(),
                        Err(e) => e.to_string(),
                    };
                    error!("Send worker for {} stopped unexpectedly: {}", local, reason);
                    return Err(NodeError::TaskFailed(format!("send worker: {reason}")));
                }

                Some(inbound) = self.inbound.recv() => {
                    self.node.handle_inbound(&inbound.from, &inbound.bytes).await;
                }

                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }

                tick = self.scheduler.next() => {
                    self.handle_tick(tick).await;
                }
            }
        };

        // Dropping the node closes the outbox; the worker drains what is queued
        drop(self.node);
        self.worker
            .await
            .map_err(|e| NodeError::TaskFailed(format!("send worker: {e}")))?;
        info!("Node {} stopped", local);
        result
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send {
                to,
                kind,
                payload,
                reply,
            } => {
                let result = self.node.originate_data(to, kind, payload).await;
                let _ = reply.send(result);
            }
            Command::Probe { target, reply } => {
                let result = self.node.probe(target).await;
                let _ = reply.send(result);
            }
            Command::Announce { reply } => {
                let result = self.node.announce().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_tick(&mut self, tick: Tick) {
        match tick {
            Tick::Discover => {
                self.node.discover_neighbors().await;
            }
            Tick::Announce => {
                if let Err(e) = self.node.announce().await {
                    warn!("Failed to announce link state: {}", e);
                }
            }
            Tick::Maintain => {
                match self.node.maintenance().await {
                    Ok(report) => debug!(
                        "Maintenance on {}: {} records expired, {} ids purged",
                        self.node.local_address(),
                        report.expired_records,
                        report.purged_ids
                    ),
                    Err(e) => warn!("Maintenance failed: {}", e),
                }
                self.failures.cleanup_old_failures().await;
            }
        }
    }
}

/// Application-side handle to a running node
pub struct NodeHandle {
    local: NodeAddress,
    commands: mpsc::Sender<Command>,
    routes: RouteReader,
    events: broadcast::Sender<NodeEvent>,
    send_stats: Arc<SendStats>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), NodeError>>,
}

impl NodeHandle {
    /// Address of the node
    pub fn local_address(&self) -> &NodeAddress {
        &self.local
    }

    /// Originate a data message
    pub async fn send(
        &self,
        to: NodeAddress,
        kind: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<MessageId, NodeError> {
        let (kind, payload) = (kind.into(), payload.into());
        self.request(|reply| Command::Send {
            to,
            kind,
            payload,
            reply,
        })
        .await
    }

    /// Send an echo probe
    pub async fn probe(&self, target: NodeAddress) -> Result<MessageId, NodeError> {
        self.request(|reply| Command::Probe { target, reply }).await
    }

    /// Flood a link-state advertisement now
    pub async fn announce(&self) -> Result<MessageId, NodeError> {
        self.request(|reply| Command::Announce { reply }).await
    }

    /// Reader of the node's published routing table
    pub fn routes(&self) -> RouteReader {
        self.routes.clone()
    }

    /// Subscribe to application events
    pub fn events(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Transport send counters
    pub fn send_stats(&self) -> Arc<SendStats> {
        Arc::clone(&self.send_stats)
    }

    /// Stop the node and wait for its tasks to finish
    pub async fn shutdown(mut self) -> Result<(), NodeError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .map_err(|e| NodeError::TaskFailed(e.to_string()))?
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)?
    }
}
