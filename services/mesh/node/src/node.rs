//! Per-node routing engine.
//!
//! [`RouterNode`] owns the link-state store, the published routing table and
//! the flood controller of one node. Inbound bytes are decoded once and
//! dispatched by kind:
//!
//! - `info` is re-flooded first, then applied to the store, then routes are
//!   recomputed and republished
//! - `echo` addressed to us is timed, otherwise relayed like data
//! - data addressed to us is delivered, otherwise flooded or forwarded to the
//!   next hop depending on [`RoutingMode`]
//!
//! Every transmission goes through the [`Outbox`]; the node never touches the
//! transport.

use crate::config::NodeConfig;
use crate::echo;
use crate::error::NodeError;
use crate::flood::{FloodController, FloodOutcome};
use crate::outbox::{Outbox, OutboundSend};
use mesh_routing::{
    LinkStateRouter, RoutePublisher, RouteReader, Router, RouterStats, RoutingDecision,
    RoutingMode, RoutingTable,
};
use mesh_storage::Dedup;
use mesh_topology::TopologyDatabase;
use mesh_wire::{Body, Message, MessageId, MessageKind, NodeAddress};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Something the application boundary should know about
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// A data message addressed to this node arrived
    Delivered {
        /// Message id
        id: MessageId,
        /// Originating node
        from: NodeAddress,
        /// Path trace
        path: Vec<NodeAddress>,
        /// Hop count
        hops: u32,
        /// Application `type`
        kind: String,
        /// Application payload
        payload: String,
    },
    /// An echo addressed to this node arrived and was timed
    EchoReply {
        /// Node that sent the probe
        from: NodeAddress,
        /// Elapsed time since the probe was sent
        rtt: Duration,
        /// The probe carried a timestamp in the future
        clock_skew: bool,
    },
    /// A message could not be routed and was dropped
    Undeliverable {
        /// Message id
        id: MessageId,
        /// Destination without a route
        to: NodeAddress,
    },
}

/// What one maintenance pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Link-state records dropped for age
    pub expired_records: usize,
    /// Dedup ids dropped for age
    pub purged_ids: usize,
}

/// Routing engine of one node
pub struct RouterNode {
    local: NodeAddress,
    mode: RoutingMode,
    neighbors: Vec<NodeAddress>,
    topology: TopologyDatabase,
    publisher: RoutePublisher,
    router: LinkStateRouter,
    flood: FloodController,
    dedup: Arc<dyn Dedup>,
    outbox: Outbox,
    events: broadcast::Sender<NodeEvent>,
    record_max_age: Duration,
}

impl RouterNode {
    /// Create the engine. The initial routing table holds the direct neighbors.
    pub fn new(
        config: &NodeConfig,
        dedup: Arc<dyn Dedup>,
        outbox: Outbox,
        events: broadcast::Sender<NodeEvent>,
    ) -> Self {
        let local = config.local_address.clone();
        let neighbors = config.neighbors();
        let topology = TopologyDatabase::new(local.clone(), config.neighbor_costs.clone());

        let (mut publisher, reader) = RoutePublisher::new();
        publisher.publish(&topology.compute_routes());

        Self {
            router: LinkStateRouter::new(local.clone(), reader),
            flood: FloodController::new(local.clone(), neighbors.clone(), Arc::clone(&dedup)),
            local,
            mode: config.mode,
            neighbors,
            topology,
            publisher,
            dedup,
            outbox,
            events,
            record_max_age: config.scheduler.record_max_age,
        }
    }

    /// Address of this node
    pub fn local_address(&self) -> &NodeAddress {
        &self.local
    }

    /// Data forwarding mode
    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Direct neighbors
    pub fn neighbors(&self) -> &[NodeAddress] {
        &self.neighbors
    }

    /// Reader of the published routing table
    pub fn routes(&self) -> RouteReader {
        self.publisher.reader()
    }

    /// Currently published routing table
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        self.publisher.current()
    }

    /// Link-state store
    pub fn topology(&self) -> &TopologyDatabase {
        &self.topology
    }

    /// Forwarding statistics
    pub fn router_stats(&self) -> RouterStats {
        self.router.get_stats()
    }

    /// Subscribe to application events
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Process bytes handed over by the transport. Never fails: undecodable
    /// input and processing errors are logged and the message dropped.
    pub async fn handle_inbound(&mut self, sender: &NodeAddress, bytes: &[u8]) {
        let message = match mesh_wire::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable message from {}: {}", sender, e);
                return;
            }
        };

        debug!(
            "Received {} message {} from {} via {}",
            message.kind(),
            message.id,
            message.from,
            sender
        );

        let id = message.id.clone();
        let result = match message.kind() {
            MessageKind::Info => self.handle_info(sender, message).await,
            MessageKind::Echo | MessageKind::Data => {
                if message.to == self.local {
                    self.arrive(message).await
                } else {
                    self.relay(Some(sender), message).await
                }
            }
        };

        if let Err(e) = result {
            warn!("Failed to process message {} from {}: {}", id, sender, e);
        }
    }

    /// Originate a data message. A missing route is reported through
    /// [`NodeEvent::Undeliverable`], not as an error.
    pub async fn originate_data(
        &mut self,
        to: NodeAddress,
        kind: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<MessageId, NodeError> {
        let message = Message::data(self.local.clone(), to, kind, payload);
        let id = message.id.clone();
        info!("Sending message {} to {} ({} mode)", id, message.to, self.mode);

        if message.to == self.local {
            self.arrive(message).await?;
        } else {
            self.relay(None, message).await?;
        }
        Ok(id)
    }

    /// Send an echo probe to `target`. Neighbors are probed directly,
    /// anything else is routed like data.
    pub async fn probe(&mut self, target: NodeAddress) -> Result<MessageId, NodeError> {
        let message = echo::build_probe(&self.local, &target);
        let id = message.id.clone();

        if self.neighbors.contains(&target) {
            self.transmit(&target, &message).await?;
            info!("Sent echo {} to {}", id, target);
        } else {
            self.relay(None, message).await?;
        }
        Ok(id)
    }

    /// Echo every configured neighbor. Returns how many probes were queued.
    pub async fn discover_neighbors(&mut self) -> usize {
        let mut sent = 0;
        for neighbor in self.neighbors.clone() {
            match self.probe(neighbor.clone()).await {
                Ok(_) => sent += 1,
                Err(e) => warn!("Failed to probe neighbor {}: {}", neighbor, e),
            }
        }
        debug!("Neighbor discovery sent {} echoes", sent);
        sent
    }

    /// Flood the next local link-state advertisement
    pub async fn announce(&mut self) -> Result<MessageId, NodeError> {
        let ad = self.topology.local_advertisement();
        let mut message = Message::advertisement(self.local.clone(), ad.sequence, ad.costs);

        match self.flood_out(&mut message, None).await? {
            FloodOutcome::Forwarded(targets) => info!(
                "Shared link state (seq {}) with {} neighbors",
                ad.sequence,
                targets.len()
            ),
            outcome => debug!("Local advertisement {} not flooded: {:?}", message.id, outcome),
        }
        Ok(message.id)
    }

    /// Age out stale link-state records and dedup ids
    pub async fn maintenance(&mut self) -> Result<MaintenanceReport, NodeError> {
        let expired_records = self
            .topology
            .expire_older_than(self.record_max_age, Instant::now());
        if expired_records > 0 {
            info!("Expired {} stale link-state records", expired_records);
            self.recompute();
        }

        let purged_ids = self.dedup.purge_expired().await?;
        Ok(MaintenanceReport {
            expired_records,
            purged_ids,
        })
    }

    async fn handle_info(&mut self, sender: &NodeAddress, mut message: Message) -> Result<(), NodeError> {
        let Body::Info(ad) = message.body.clone() else {
            return Ok(());
        };
        let origin = message.from.clone();
        info!("Received link state info from {} (seq {})", origin, ad.sequence);

        // Re-flood regardless of mode, then apply
        let flooded = self.flood_out(&mut message, Some(sender)).await;

        let outcome = self.topology.update(&origin, ad.sequence, ad.costs);
        debug!("Link state update from {}: {:?}", origin, outcome);
        self.recompute();

        flooded.map(|_| ())
    }

    /// Handle a message addressed to this node
    async fn arrive(&mut self, message: Message) -> Result<(), NodeError> {
        if !self.dedup.check_and_mark(&message.id).await? {
            debug!("Ignoring duplicate arrival of {}", message.id);
            return Ok(());
        }

        match &message.body {
            Body::Data(data) => {
                info!(
                    "Message {} from {} reached its destination",
                    message.id, message.from
                );
                info!("Path taken: {}", message.path_display());
                info!("Number of hops: {}", message.hops);
                self.emit(NodeEvent::Delivered {
                    id: message.id.clone(),
                    from: message.from.clone(),
                    path: message.path.clone(),
                    hops: message.hops,
                    kind: data.kind.clone(),
                    payload: data.payload.clone(),
                });
            }
            Body::Echo(_) => {
                if let Some(measurement) = echo::measure_now(&message) {
                    if measurement.clock_skew {
                        warn!(
                            "ECHO from {} is stamped {:.3} seconds in the future, clocks are skewed",
                            message.from, -measurement.elapsed_secs
                        );
                    } else {
                        info!(
                            "ECHO reply from {}, RTT: {:.3} seconds",
                            message.from, measurement.elapsed_secs
                        );
                    }
                    self.emit(NodeEvent::EchoReply {
                        from: message.from.clone(),
                        rtt: measurement.rtt,
                        clock_skew: measurement.clock_skew,
                    });
                }
            }
            Body::Info(_) => {}
        }
        Ok(())
    }

    /// Move a message not addressed to us one step closer to its destination
    async fn relay(&mut self, sender: Option<&NodeAddress>, mut message: Message) -> Result<(), NodeError> {
        match self.mode {
            RoutingMode::Flooding => {
                self.flood_out(&mut message, sender).await?;
                Ok(())
            }
            RoutingMode::LinkState => self.forward(message).await,
        }
    }

    async fn forward(&mut self, mut message: Message) -> Result<(), NodeError> {
        if message.has_visited(&self.local) {
            warn!(
                "Dropping message {} to {}: already passed through {} (path: {})",
                message.id,
                message.to,
                self.local,
                message.path_display()
            );
            self.emit(NodeEvent::Undeliverable {
                id: message.id,
                to: message.to,
            });
            return Ok(());
        }

        match self.router.decide(&message.to) {
            RoutingDecision::Forward(hop) => {
                message.record_hop(&self.local);
                self.transmit(&hop.node_id, &message).await?;
                info!(
                    "Forwarded message {} to {} via {}",
                    message.id, message.to, hop.node_id
                );
                Ok(())
            }
            RoutingDecision::Local => self.arrive(message).await,
            RoutingDecision::Drop(reason) => {
                error!("No route to {} for message {}: {}", message.to, message.id, reason);
                self.emit(NodeEvent::Undeliverable {
                    id: message.id,
                    to: message.to,
                });
                Ok(())
            }
        }
    }

    async fn flood_out(
        &mut self,
        message: &mut Message,
        sender: Option<&NodeAddress>,
    ) -> Result<FloodOutcome, NodeError> {
        let outcome = self.flood.offer(message, sender).await?;

        if let FloodOutcome::Forwarded(targets) = &outcome {
            if !targets.is_empty() {
                let bytes = mesh_wire::encode(message)?;
                for target in targets {
                    self.outbox
                        .enqueue(OutboundSend {
                            to: target.clone(),
                            bytes: bytes.clone(),
                            id: message.id.clone(),
                        })
                        .await?;
                    debug!("Forwarded flood message {} to {}", message.id, target);
                }
            }
        }
        Ok(outcome)
    }

    async fn transmit(&self, to: &NodeAddress, message: &Message) -> Result<(), NodeError> {
        let bytes = mesh_wire::encode(message)?;
        self.outbox
            .enqueue(OutboundSend {
                to: to.clone(),
                bytes,
                id: message.id.clone(),
            })
            .await
    }

    fn recompute(&mut self) -> Arc<RoutingTable> {
        let routes = self.topology.compute_routes();
        let table = self.publisher.publish(&routes);
        debug!("Link state database:\n{}", self.render_topology());
        debug!(
            "Computed routing table (epoch {}):\n{}",
            table.epoch(),
            table.render()
        );
        table
    }

    fn render_topology(&self) -> String {
        self.topology
            .records()
            .map(|record| {
                let costs = record
                    .neighbor_costs
                    .iter()
                    .map(|(neighbor, cost)| format!("{neighbor}: {cost}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} (seq {}): {{{}}}", record.origin, record.sequence, costs)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn emit(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            debug!("No subscriber for node events on {}", self.local);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_storage::MemoryDedup;
    use mesh_wire::{Cost, EchoBody, NeighborCosts};
    use std::collections::{BTreeMap, VecDeque};
    use tokio::sync::mpsc;

    fn addr(s: &str) -> NodeAddress {
        NodeAddress::from(s)
    }

    fn costs(pairs: &[(&str, u32)]) -> NeighborCosts {
        pairs.iter().map(|(n, c)| (addr(n), Cost::from(*c))).collect()
    }

    fn single_node(
        local: &str,
        neighbors: &[(&str, u32)],
        mode: RoutingMode,
    ) -> (RouterNode, mpsc::Receiver<OutboundSend>, broadcast::Receiver<NodeEvent>) {
        let mut config = NodeConfig::new(addr(local), costs(neighbors), mode);
        config.scheduler.record_max_age = Duration::from_millis(20);
        let (outbox, rx) = Outbox::channel(1024);
        let (events, events_rx) = broadcast::channel(64);
        let node = RouterNode::new(&config, Arc::new(MemoryDedup::with_defaults()), outbox, events);
        (node, rx, events_rx)
    }

    /// In-process network delivering queued sends in FIFO order
    struct Net {
        nodes: BTreeMap<NodeAddress, RouterNode>,
        queues: BTreeMap<NodeAddress, mpsc::Receiver<OutboundSend>>,
        events: BTreeMap<NodeAddress, broadcast::Receiver<NodeEvent>>,
        log: Vec<(NodeAddress, NodeAddress, Message)>,
    }

    impl Net {
        fn new(mode: RoutingMode, edges: &[(&str, &str, u32)]) -> Self {
            let mut adjacency: BTreeMap<NodeAddress, NeighborCosts> = BTreeMap::new();
            for (a, b, cost) in edges {
                adjacency.entry(addr(a)).or_default().insert(addr(b), Cost::from(*cost));
                adjacency.entry(addr(b)).or_default().insert(addr(a), Cost::from(*cost));
            }

            let mut net = Net {
                nodes: BTreeMap::new(),
                queues: BTreeMap::new(),
                events: BTreeMap::new(),
                log: Vec::new(),
            };
            for (local, neighbor_costs) in adjacency {
                let config = NodeConfig::new(local.clone(), neighbor_costs, mode);
                let (outbox, rx) = Outbox::channel(1024);
                let (events, events_rx) = broadcast::channel(64);
                let node =
                    RouterNode::new(&config, Arc::new(MemoryDedup::with_defaults()), outbox, events);
                net.nodes.insert(local.clone(), node);
                net.queues.insert(local.clone(), rx);
                net.events.insert(local, events_rx);
            }
            net
        }

        fn node(&mut self, name: &str) -> &mut RouterNode {
            self.nodes.get_mut(&addr(name)).unwrap()
        }

        async fn announce_all(&mut self) {
            for node in self.nodes.values_mut() {
                node.announce().await.unwrap();
            }
            self.run().await;
        }

        async fn run(&mut self) {
            let mut queue = VecDeque::new();
            loop {
                for (from, rx) in self.queues.iter_mut() {
                    while let Ok(send) = rx.try_recv() {
                        queue.push_back((from.clone(), send));
                    }
                }
                let Some((from, send)) = queue.pop_front() else {
                    break;
                };
                let message = mesh_wire::decode(&send.bytes).unwrap();
                self.log.push((from.clone(), send.to.clone(), message));
                if let Some(node) = self.nodes.get_mut(&send.to) {
                    node.handle_inbound(&from, &send.bytes).await;
                }
            }
        }

        fn take_events(&mut self, name: &str) -> Vec<NodeEvent> {
            let rx = self.events.get_mut(&addr(name)).unwrap();
            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn arrivals(&self, at: &str, id: &MessageId) -> Vec<&Message> {
            self.log
                .iter()
                .filter(|(_, to, msg)| *to == addr(at) && msg.id == *id)
                .map(|(_, _, msg)| msg)
                .collect()
        }

        fn sends_by(&self, from: &str, id: &MessageId) -> usize {
            self.log
                .iter()
                .filter(|(sender, _, msg)| *sender == addr(from) && msg.id == *id)
                .count()
        }
    }

    #[tokio::test]
    async fn test_triangle_converges_to_cheapest_path() {
        let mut net = Net::new(
            RoutingMode::LinkState,
            &[("x", "y", 1), ("y", "z", 1), ("x", "z", 5)],
        );
        net.announce_all().await;

        let table = net.node("x").routing_table();
        let hop = table.get(&addr("z")).unwrap();
        assert_eq!(hop.node_id, addr("y"));
        assert_eq!(hop.cost, Cost::from(2));

        let id = net
            .node("x")
            .originate_data(addr("z"), "message", "hello z")
            .await
            .unwrap();
        net.run().await;

        let events = net.take_events("z");
        assert_eq!(
            events,
            vec![NodeEvent::Delivered {
                id,
                from: addr("x"),
                path: vec![addr("x"), addr("y")],
                hops: 2,
                kind: "message".to_string(),
                payload: "hello z".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_ring_flood_reaches_each_node_once() {
        let mut net = Net::new(
            RoutingMode::Flooding,
            &[("x", "y", 1), ("y", "z", 1), ("z", "x", 1)],
        );

        let id = net
            .node("x")
            .originate_data(addr("nowhere"), "message", "flood")
            .await
            .unwrap();
        net.run().await;

        for name in ["y", "z"] {
            let arrivals = net.arrivals(name, &id);
            assert_eq!(arrivals[0].hops, 1, "first arrival at {name}");
            assert_eq!(net.sends_by(name, &id), 1, "{name} floods once");
        }
        assert_eq!(net.sends_by("x", &id), 2);
        assert_eq!(net.log.len(), 4);
        assert!(net.take_events("y").is_empty());
        assert!(net.take_events("z").is_empty());
    }

    #[tokio::test]
    async fn test_flooded_data_is_delivered_once() {
        let mut net = Net::new(
            RoutingMode::Flooding,
            &[("x", "y", 1), ("y", "z", 1), ("z", "w", 1), ("w", "x", 1)],
        );

        net.node("x")
            .originate_data(addr("z"), "message", "two paths")
            .await
            .unwrap();
        net.run().await;

        let events = net.take_events("z");
        assert_eq!(events.len(), 1);
        match &events[0] {
            NodeEvent::Delivered { hops, path, .. } => {
                assert_eq!(*hops, 2);
                assert_eq!(path.len(), 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fractional_cost_advertisement_is_stored_and_reflooded() {
        let (mut node, mut sends, _events) =
            single_node("a", &[("b", 1), ("c", 1)], RoutingMode::LinkState);

        let json = br#"{
            "id": "ls_b_1", "type": "info", "from": "b", "to": "all",
            "payload": "{\"a\": 1.5, \"e\": 2.0}"
        }"#;
        node.handle_inbound(&addr("b"), json).await;

        let send = sends.try_recv().unwrap();
        assert_eq!(send.to, addr("c"));
        assert_eq!(mesh_wire::decode(&send.bytes).unwrap().id.as_str(), "ls_b_1");
        assert!(node.topology().get(&addr("b")).is_some());
        assert_eq!(node.routing_table().get(&addr("e")).unwrap().cost, Cost::from(3));
    }

    #[tokio::test]
    async fn test_duplicate_advertisement_reflooded_on_first_arrival_only() {
        let mut net = Net::new(
            RoutingMode::LinkState,
            &[("a", "b", 1), ("a", "c", 1), ("b", "d", 1), ("c", "d", 1)],
        );

        let id = net.node("a").announce().await.unwrap();
        net.run().await;

        assert_eq!(id, MessageId::advertisement(&addr("a"), 1));
        assert_eq!(net.arrivals("d", &id).len(), 2);
        assert_eq!(net.sends_by("d", &id), 1);
        assert!(net.node("d").topology().get(&addr("a")).is_some());
    }

    #[tokio::test]
    async fn test_later_advertisement_from_same_origin_is_reflooded() {
        let mut net = Net::new(RoutingMode::LinkState, &[("a", "b", 1), ("b", "c", 1)]);

        let first = net.node("a").announce().await.unwrap();
        net.run().await;
        let second = net.node("a").announce().await.unwrap();
        net.run().await;

        assert_ne!(first, second);
        assert_eq!(net.sends_by("b", &first), 1);
        assert_eq!(net.sends_by("b", &second), 1);
        assert_eq!(net.node("c").topology().get(&addr("a")).unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_withdrawn_link_removes_destination() {
        let (mut node, _sends, _events) = single_node("a", &[("b", 1)], RoutingMode::LinkState);

        let ad = Message::advertisement(addr("b"), 1, costs(&[("a", 1), ("e", 1)]));
        node.handle_inbound(&addr("b"), &mesh_wire::encode(&ad).unwrap())
            .await;
        assert_eq!(node.routing_table().get(&addr("e")).unwrap().cost, Cost::from(2));

        let ad = Message::advertisement(addr("b"), 2, costs(&[("a", 1)]));
        node.handle_inbound(&addr("b"), &mesh_wire::encode(&ad).unwrap())
            .await;

        let table = node.routing_table();
        assert!(!table.contains(&addr("e")));
        assert!(table.contains(&addr("b")));
    }

    #[tokio::test]
    async fn test_no_route_is_reported_and_dropped() {
        let (mut node, mut sends, mut events) =
            single_node("a", &[("b", 1)], RoutingMode::LinkState);

        let id = node
            .originate_data(addr("zz"), "message", "lost")
            .await
            .unwrap();

        assert!(sends.try_recv().is_err());
        assert_eq!(
            events.try_recv().unwrap(),
            NodeEvent::Undeliverable { id, to: addr("zz") }
        );
        assert_eq!(node.router_stats().dropped_no_route, 1);
    }

    #[tokio::test]
    async fn test_direct_neighbor_reachable_before_any_advertisement() {
        let (mut node, mut sends, _events) = single_node("a", &[("b", 3)], RoutingMode::LinkState);

        node.originate_data(addr("b"), "message", "hi").await.unwrap();

        let send = sends.try_recv().unwrap();
        assert_eq!(send.to, addr("b"));
        let message = mesh_wire::decode(&send.bytes).unwrap();
        assert_eq!(message.hops, 1);
        assert_eq!(message.path, vec![addr("a")]);
    }

    #[tokio::test]
    async fn test_malformed_inbound_is_dropped() {
        let (mut node, mut sends, mut events) =
            single_node("a", &[("b", 1)], RoutingMode::LinkState);

        node.handle_inbound(&addr("b"), b"definitely not json").await;
        node.handle_inbound(&addr("b"), br#"{"type": "echo", "from": "b", "to": "a", "payload": "later"}"#)
            .await;
        assert!(sends.try_recv().is_err());
        assert!(events.try_recv().is_err());

        // Still processing afterwards
        let msg = Message::data(addr("b"), addr("a"), "message", "after");
        node.handle_inbound(&addr("b"), &mesh_wire::encode(&msg).unwrap())
            .await;
        assert!(matches!(events.try_recv(), Ok(NodeEvent::Delivered { .. })));
    }

    #[tokio::test]
    async fn test_message_with_local_node_in_path_is_not_reflooded() {
        let (mut node, mut sends, _events) =
            single_node("y", &[("x", 1), ("z", 1)], RoutingMode::Flooding);

        let mut msg = Message::data(addr("x"), addr("q"), "message", "cycle");
        msg.record_hop(&addr("x"));
        msg.record_hop(&addr("y"));
        msg.record_hop(&addr("z"));
        node.handle_inbound(&addr("z"), &mesh_wire::encode(&msg).unwrap())
            .await;

        assert!(sends.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_forwarded_message_back_at_a_visited_node_is_dropped() {
        let (mut node, mut sends, mut events) =
            single_node("a", &[("b", 1)], RoutingMode::LinkState);

        let ad = Message::advertisement(addr("b"), 1, costs(&[("a", 1), ("z", 1)]));
        node.handle_inbound(&addr("b"), &mesh_wire::encode(&ad).unwrap())
            .await;
        assert_eq!(node.routing_table().get(&addr("z")).unwrap().node_id, addr("b"));
        while sends.try_recv().is_ok() {}
        while events.try_recv().is_ok() {}

        let mut msg = Message::data(addr("a"), addr("z"), "message", "bounced");
        msg.record_hop(&addr("a"));
        msg.record_hop(&addr("b"));
        node.handle_inbound(&addr("b"), &mesh_wire::encode(&msg).unwrap())
            .await;

        assert!(sends.try_recv().is_err());
        assert_eq!(
            events.try_recv().unwrap(),
            NodeEvent::Undeliverable {
                id: msg.id,
                to: addr("z")
            }
        );
    }

    #[tokio::test]
    async fn test_echo_addressed_here_reports_rtt() {
        let (mut node, _sends, mut events) = single_node("b", &[("a", 1)], RoutingMode::LinkState);

        let probe = echo::build_probe(&addr("a"), &addr("b"));
        node.handle_inbound(&addr("a"), &mesh_wire::encode(&probe).unwrap())
            .await;

        match events.try_recv().unwrap() {
            NodeEvent::EchoReply {
                from,
                rtt,
                clock_skew,
            } => {
                assert_eq!(from, addr("a"));
                assert!(!clock_skew);
                assert!(rtt < Duration::from_secs(5));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_echo_from_the_future_flags_clock_skew() {
        let (mut node, _sends, mut events) = single_node("b", &[("a", 1)], RoutingMode::LinkState);

        let mut probe = echo::build_probe(&addr("a"), &addr("b"));
        probe.body = Body::Echo(EchoBody {
            sent_at: mesh_wire::unix_now_secs() + 3600.0,
        });
        node.handle_inbound(&addr("a"), &mesh_wire::encode(&probe).unwrap())
            .await;

        assert_eq!(
            events.try_recv().unwrap(),
            NodeEvent::EchoReply {
                from: addr("a"),
                rtt: Duration::ZERO,
                clock_skew: true,
            }
        );
    }

    #[tokio::test]
    async fn test_echo_for_other_node_is_forwarded() {
        let mut net = Net::new(RoutingMode::LinkState, &[("a", "b", 1), ("b", "c", 1)]);
        net.announce_all().await;

        net.node("a").probe(addr("c")).await.unwrap();
        net.run().await;

        let events = net.take_events("c");
        assert!(matches!(
            events.as_slice(),
            [NodeEvent::EchoReply { clock_skew: false, .. }]
        ));
    }

    #[tokio::test]
    async fn test_discovery_probes_each_neighbor_directly() {
        let (mut node, mut sends, _events) =
            single_node("a", &[("b", 7), ("c", 7), ("i", 1)], RoutingMode::LinkState);

        assert_eq!(node.discover_neighbors().await, 3);

        let mut targets = Vec::new();
        while let Ok(send) = sends.try_recv() {
            let message = mesh_wire::decode(&send.bytes).unwrap();
            assert_eq!(message.kind(), MessageKind::Echo);
            assert_eq!(message.hops, 0);
            assert_eq!(message.to, send.to);
            targets.push(send.to);
        }
        assert_eq!(targets, vec![addr("b"), addr("c"), addr("i")]);
    }

    #[tokio::test]
    async fn test_maintenance_expires_stale_records() {
        let (mut node, _sends, _events) = single_node("a", &[("b", 1)], RoutingMode::LinkState);

        let ad = Message::advertisement(addr("b"), 1, costs(&[("a", 1), ("e", 1)]));
        node.handle_inbound(&addr("b"), &mesh_wire::encode(&ad).unwrap())
            .await;
        assert!(node.routing_table().contains(&addr("e")));

        tokio::time::sleep(Duration::from_millis(40)).await;
        let report = node.maintenance().await.unwrap();

        assert_eq!(report.expired_records, 1);
        assert!(!node.routing_table().contains(&addr("e")));
        assert!(node.routing_table().contains(&addr("b")));
    }
}
