//! Mesh network simulation binary.
//!
//! Starts every node of a network file inside one process over the
//! in-memory transport, lets link state converge, then sends the requested
//! test messages and probes and logs how they travelled.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use mesh_node::{MemoryHub, NodeEvent, NodeHandle, NodeRuntime, Transport};
use mesh_routing::RoutingMode;
use mesh_wire::NodeAddress;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::NetworkConfig;
use logging::MeshLogFormatter;

/// Crates whose verbosity follows `--log-level`
const LOG_TARGETS: &[&str] = &[
    "lsr_mesh",
    "mesh_node",
    "mesh_routing",
    "mesh_topology",
    "mesh_storage",
    "mesh_wire",
];

/// Link-state / flooding mesh network simulation
#[derive(Parser, Debug)]
#[command(name = "lsr-mesh", version, about = "Link-state / flooding mesh network simulation")]
struct Args {
    /// Network file (YAML). The built-in nine-node network is used when it does not exist.
    #[arg(long, default_value = "config/network.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Force every node into this mode (lsr or flooding)
    #[arg(long)]
    mode: Option<RoutingMode>,

    /// Link-state re-announcement interval, e.g. 30s
    #[arg(long)]
    announce_interval: Option<humantime::Duration>,

    /// Time to let the network converge before sending, e.g. 5s
    #[arg(long, default_value = "5s")]
    converge: humantime::Duration,

    /// Node that sends the test message
    #[arg(long, requires = "send_to")]
    send_from: Option<String>,

    /// Destination of the test message
    #[arg(long, requires = "send_from")]
    send_to: Option<String>,

    /// Payload of the test message
    #[arg(long, default_value = "Hello")]
    payload: String,

    /// Application message type
    #[arg(long, default_value = "message")]
    kind: String,

    /// Extra message as FROM:TO:PAYLOAD (repeatable)
    #[arg(long = "send", value_parser = parse_send)]
    sends: Vec<SendRequest>,

    /// Echo probe as FROM:TO (repeatable)
    #[arg(long = "probe", value_parser = parse_probe)]
    probes: Vec<ProbeRequest>,

    /// Stop after this long instead of waiting for Ctrl-C, e.g. 10s
    #[arg(long)]
    run_for: Option<humantime::Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SendRequest {
    from: NodeAddress,
    to: NodeAddress,
    payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProbeRequest {
    from: NodeAddress,
    to: NodeAddress,
}

fn parse_send(value: &str) -> Result<SendRequest, String> {
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(from), Some(to), Some(payload)) if !from.is_empty() && !to.is_empty() => {
            Ok(SendRequest {
                from: NodeAddress::from(from),
                to: NodeAddress::from(to),
                payload: payload.to_string(),
            })
        }
        _ => Err(format!("expected FROM:TO:PAYLOAD, got '{}'", value)),
    }
}

fn parse_probe(value: &str) -> Result<ProbeRequest, String> {
    match value.split_once(':') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() && !to.contains(':') => {
            Ok(ProbeRequest {
                from: NodeAddress::from(from),
                to: NodeAddress::from(to),
            })
        }
        _ => Err(format!("expected FROM:TO, got '{}'", value)),
    }
}

impl Args {
    /// `--send-from/--send-to` followed by every `--send`
    fn send_requests(&self) -> Vec<SendRequest> {
        let mut requests = Vec::new();
        if let (Some(from), Some(to)) = (&self.send_from, &self.send_to) {
            requests.push(SendRequest {
                from: NodeAddress::from(from.as_str()),
                to: NodeAddress::from(to.as_str()),
                payload: self.payload.clone(),
            });
        }
        requests.extend(self.sends.iter().cloned());
        requests
    }
}

fn init_logging(level: &str) -> Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => {
            let mut filter = EnvFilter::new("warn");
            for target in LOG_TARGETS {
                filter = filter.add_directive(format!("{}={}", target, level).parse()?);
            }
            filter
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(MeshLogFormatter::new("lsr-mesh"))
        .init();

    Ok(())
}

/// Log what reaches the application boundary of one node
fn spawn_event_logger(
    local: NodeAddress,
    mut events: broadcast::Receiver<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(NodeEvent::Delivered {
                    from,
                    path,
                    hops,
                    kind,
                    payload,
                    ..
                }) => {
                    let path: Vec<&str> = path.iter().map(NodeAddress::as_str).collect();
                    component_info!(
                        "app",
                        "{} received {} from {}: '{}' via [{}] in {} hops",
                        local,
                        kind,
                        from,
                        payload,
                        path.join(" -> "),
                        hops
                    );
                }
                Ok(NodeEvent::EchoReply {
                    from,
                    rtt,
                    clock_skew,
                }) => {
                    if clock_skew {
                        component_warn!("app", "{} echo from {}: clock skew detected", local, from);
                    } else {
                        component_info!(
                            "app",
                            "{} echo from {}: {:.3} ms",
                            local,
                            from,
                            rtt.as_secs_f64() * 1000.0
                        );
                    }
                }
                Ok(NodeEvent::Undeliverable { id, to }) => {
                    component_warn!("app", "{} could not deliver {} to {}", local, id, to);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger for {} skipped {} events", local, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn node<'a>(nodes: &'a BTreeMap<NodeAddress, NodeHandle>, address: &NodeAddress) -> Result<&'a NodeHandle> {
    nodes
        .get(address)
        .ok_or_else(|| anyhow!("node {} is not part of the network", address))
}

async fn wait_for_stop(run_for: Option<humantime::Duration>) -> Result<()> {
    match run_for {
        Some(duration) => {
            info!("Running for {}", duration);
            tokio::select! {
                _ = tokio::time::sleep(duration.into()) => {}
                signal = tokio::signal::ctrl_c() => signal.context("failed to listen for Ctrl-C")?,
            }
        }
        None => {
            info!("Network running, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
        }
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting lsr-mesh v{}", env!("CARGO_PKG_VERSION"));

    let mut network = NetworkConfig::load_from_file(&args.config)?;
    if let Some(mode) = args.mode {
        info!("Routing mode overridden by command line: {}", mode);
        network.override_mode(mode);
    }
    if let Some(interval) = args.announce_interval {
        network.timers.announce_interval = interval.to_string();
    }
    let configs = network.node_configs()?;

    let requests = args.send_requests();
    let addresses = network.addresses();
    for request in &requests {
        if !addresses.contains(&request.from) {
            bail!("--send source {} is not part of the network", request.from);
        }
    }

    let hub = MemoryHub::new();
    let mut nodes = BTreeMap::new();
    let mut loggers = Vec::new();
    for config in configs {
        let address = config.local_address.clone();
        let transport: Arc<dyn Transport> = Arc::new(hub.transport(address.clone()));
        let handle = NodeRuntime::spawn(config, transport)
            .await
            .with_context(|| format!("failed to start node {}", address))?;
        loggers.push(spawn_event_logger(address.clone(), handle.events()));
        nodes.insert(address, handle);
    }
    component_info!("network", "Started {} nodes, converging for {}", nodes.len(), args.converge);

    tokio::time::sleep(args.converge.into()).await;

    for (address, handle) in &nodes {
        let table = handle.routes().snapshot();
        debug!("Routing table of {} (epoch {}):\n{}", address, table.epoch(), table.render());
        component_info!("network", "{} knows {} routes", address, table.len());
    }

    for request in &requests {
        let sender = node(&nodes, &request.from)?;
        match sender
            .send(request.to.clone(), args.kind.clone(), request.payload.clone())
            .await
        {
            Ok(id) => component_info!(
                "network",
                "Sent {} from {} to {}",
                id,
                request.from,
                request.to
            ),
            Err(e) => component_warn!(
                "network",
                "Failed to send from {} to {}: {}",
                request.from,
                request.to,
                e
            ),
        }
    }

    for probe in &args.probes {
        let sender = node(&nodes, &probe.from)?;
        if let Err(e) = sender.probe(probe.to.clone()).await {
            component_warn!("network", "Failed to probe {} from {}: {}", probe.to, probe.from, e);
        }
    }

    wait_for_stop(args.run_for).await?;

    component_info!("network", "Shutting down {} nodes", nodes.len());
    for (address, handle) in nodes {
        let stats = handle.send_stats();
        if let Err(e) = handle.shutdown().await {
            warn!("Node {} did not stop cleanly: {}", address, e);
        }
        debug!(
            "Node {} sent {} messages, {} failed",
            address,
            stats.sent(),
            stats.failed()
        );
    }
    for logger in loggers {
        let _ = logger.await;
    }

    info!("Simulation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let request = parse_send("a@mesh:d@mesh:Test: with colon").unwrap();
        assert_eq!(request.from, NodeAddress::from("a@mesh"));
        assert_eq!(request.to, NodeAddress::from("d@mesh"));
        assert_eq!(request.payload, "Test: with colon");

        assert_eq!(parse_send("a:b:").unwrap().payload, "");
        assert!(parse_send("a:b").is_err());
        assert!(parse_send(":b:x").is_err());
    }

    #[test]
    fn test_parse_probe() {
        let probe = parse_probe("a@mesh:h@mesh").unwrap();
        assert_eq!(probe.from, NodeAddress::from("a@mesh"));
        assert_eq!(probe.to, NodeAddress::from("h@mesh"));

        assert!(parse_probe("a").is_err());
        assert!(parse_probe("a:b:c").is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "lsr-mesh",
            "--mode",
            "flooding",
            "--send-from",
            "a@mesh",
            "--send-to",
            "d@mesh",
            "--send",
            "b@mesh:c@mesh:second",
            "--converge",
            "2s",
        ])
        .unwrap();

        assert_eq!(args.mode, Some(RoutingMode::Flooding));
        assert_eq!(*args.converge, std::time::Duration::from_secs(2));

        let requests = args.send_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].payload, "Hello");
        assert_eq!(requests[1].to, NodeAddress::from("c@mesh"));

        assert!(Args::try_parse_from(["lsr-mesh", "--send-from", "a"]).is_err());
        assert!(Args::try_parse_from(["lsr-mesh", "--mode", "rip"]).is_err());
    }
}
