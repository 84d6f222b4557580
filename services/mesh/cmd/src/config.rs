use anyhow::{bail, Context, Result};
use mesh_node::{NodeConfig, SchedulerConfig};
use mesh_routing::RoutingMode;
use mesh_storage::DedupConfig;
use mesh_wire::{Cost, NeighborCosts, NodeAddress};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Network file used when no `--config` exists on disk
const BUILTIN_NETWORK: &str = include_str!("../../config/network.yaml");

/// A whole simulated network: every node plus shared tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Default forwarding mode for nodes that do not set one
    #[serde(default)]
    pub mode: RoutingMode,

    #[serde(default)]
    pub timers: TimersConfig,

    #[serde(default)]
    pub dedup: DedupSettings,

    #[serde(default = "default_capacity")]
    pub outbox_capacity: usize,

    #[serde(default = "default_capacity")]
    pub inbound_capacity: usize,

    pub nodes: Vec<NodeEntry>,
}

/// One node of the network file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub address: String,

    /// Direct neighbors and link costs
    #[serde(default)]
    pub neighbors: BTreeMap<String, Cost>,

    /// Overrides the network-wide mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RoutingMode>,
}

/// Timer settings as humantime strings (`1s`, `30s`, `5m`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConfig {
    #[serde(default = "default_discovery_delay")]
    pub discovery_delay: String,

    #[serde(default = "default_announce_interval")]
    pub announce_interval: String,

    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval: String,

    #[serde(default = "default_record_max_age")]
    pub record_max_age: String,
}

/// Dedup cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    #[serde(default = "default_dedup_retention")]
    pub retention: String,

    #[serde(default = "default_dedup_max_entries")]
    pub max_entries: usize,
}

fn default_capacity() -> usize {
    mesh_node::config::DEFAULT_INBOUND_CAPACITY
}

fn default_discovery_delay() -> String {
    "1s".to_string()
}

fn default_announce_interval() -> String {
    "30s".to_string()
}

fn default_maintenance_interval() -> String {
    "60s".to_string()
}

fn default_record_max_age() -> String {
    "5m".to_string()
}

fn default_dedup_retention() -> String {
    "5m".to_string()
}

fn default_dedup_max_entries() -> usize {
    DedupConfig::default().max_entries
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            discovery_delay: default_discovery_delay(),
            announce_interval: default_announce_interval(),
            maintenance_interval: default_maintenance_interval(),
            record_max_age: default_record_max_age(),
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            retention: default_dedup_retention(),
            max_entries: default_dedup_max_entries(),
        }
    }
}

impl TimersConfig {
    pub fn to_scheduler_config(&self) -> Result<SchedulerConfig> {
        Ok(SchedulerConfig {
            discovery_delay: parse_duration("timers.discovery_delay", &self.discovery_delay)?,
            announce_interval: parse_duration("timers.announce_interval", &self.announce_interval)?,
            maintenance_interval: parse_duration(
                "timers.maintenance_interval",
                &self.maintenance_interval,
            )?,
            record_max_age: parse_duration("timers.record_max_age", &self.record_max_age)?,
        })
    }
}

impl DedupSettings {
    pub fn to_dedup_config(&self) -> Result<DedupConfig> {
        Ok(DedupConfig {
            retention: parse_duration("dedup.retention", &self.retention)?,
            max_entries: self.max_entries,
        })
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .with_context(|| format!("invalid duration '{}' for {}", value, field))
}

impl NetworkConfig {
    /// The nine-node lab network shipped with the binary
    pub fn builtin() -> Result<Self> {
        serde_yaml::from_str(BUILTIN_NETWORK).context("built-in network file is invalid")
    }

    /// Load a network file, falling back to the built-in network when the
    /// file does not exist. Environment overrides are applied last.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: NetworkConfig = serde_yaml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            info!(
                "Loaded network with {} nodes from {}",
                config.nodes.len(),
                path.display()
            );
            config
        } else {
            warn!(
                "Network file {} not found, using built-in network",
                path.display()
            );
            Self::builtin()?
        };

        config.apply_environment_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MESH_*` overrides, reading variables through `lookup`
    pub fn apply_environment_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("MESH_MODE") {
            self.mode = mode
                .parse()
                .with_context(|| format!("invalid MESH_MODE '{}'", mode))?;
            for node in &mut self.nodes {
                node.mode = None;
            }
            info!("Routing mode overridden by environment: {}", self.mode);
        }

        if let Some(interval) = lookup("MESH_ANNOUNCE_INTERVAL") {
            parse_duration("MESH_ANNOUNCE_INTERVAL", &interval)?;
            info!("Announce interval overridden by environment: {}", interval);
            self.timers.announce_interval = interval;
        }

        if let Some(delay) = lookup("MESH_DISCOVERY_DELAY") {
            parse_duration("MESH_DISCOVERY_DELAY", &delay)?;
            info!("Discovery delay overridden by environment: {}", delay);
            self.timers.discovery_delay = delay;
        }

        Ok(())
    }

    /// Force every node into `mode`
    pub fn override_mode(&mut self, mode: RoutingMode) {
        self.mode = mode;
        for node in &mut self.nodes {
            node.mode = None;
        }
    }

    /// Addresses of every configured node
    pub fn addresses(&self) -> BTreeSet<NodeAddress> {
        self.nodes
            .iter()
            .map(|node| NodeAddress::from(node.address.as_str()))
            .collect()
    }

    /// Per-node construction configs. Duplicate addresses are rejected;
    /// neighbors that are not part of the network only produce a warning
    /// since sends to them will fail at the transport.
    pub fn node_configs(&self) -> Result<Vec<NodeConfig>> {
        if self.nodes.is_empty() {
            bail!("network has no nodes");
        }

        let scheduler = self.timers.to_scheduler_config()?;
        let dedup = self.dedup.to_dedup_config()?;

        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.address.as_str()) {
                bail!("node {} is listed more than once", node.address);
            }
        }

        let mut configs = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let neighbor_costs: NeighborCosts = node
                .neighbors
                .iter()
                .map(|(addr, cost)| (NodeAddress::from(addr.as_str()), *cost))
                .collect();

            for neighbor in neighbor_costs.keys() {
                if !seen.contains(neighbor.as_str()) {
                    warn!(
                        "Node {} lists neighbor {} which is not in the network",
                        node.address, neighbor
                    );
                }
            }

            let mut config = NodeConfig::new(
                NodeAddress::from(node.address.as_str()),
                neighbor_costs,
                node.mode.unwrap_or(self.mode),
            );
            config.scheduler = scheduler.clone();
            config.dedup = dedup.clone();
            config.outbox_capacity = self.outbox_capacity;
            config.inbound_capacity = self.inbound_capacity;
            config
                .validate()
                .with_context(|| format!("invalid configuration for node {}", node.address))?;

            configs.push(config);
        }

        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TRIANGLE: &str = r#"
mode: flooding
timers:
  announce_interval: 10s
nodes:
  - address: x
    neighbors: { y: 1, z: 4 }
  - address: y
    neighbors: { x: 1, z: 1 }
    mode: lsr
  - address: z
    neighbors: { x: 4, y: 1 }
"#;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_builtin_network() {
        let config = NetworkConfig::builtin().unwrap();
        let nodes = config.node_configs().unwrap();

        assert_eq!(nodes.len(), 9);
        assert_eq!(config.mode, RoutingMode::LinkState);

        let a = &nodes[0];
        assert_eq!(a.local_address, NodeAddress::from("a@mesh"));
        assert_eq!(a.neighbor_costs.get("i@mesh"), Some(&Cost::from(1)));
        assert_eq!(a.scheduler.announce_interval, Duration::from_secs(30));
        assert_eq!(a.dedup.retention, Duration::from_secs(300));
    }

    #[test]
    fn test_builtin_links_are_symmetric() {
        let config = NetworkConfig::builtin().unwrap();
        let costs: HashMap<_, _> = config
            .nodes
            .iter()
            .map(|node| (node.address.clone(), node.neighbors.clone()))
            .collect();

        for (node, neighbors) in &costs {
            for (neighbor, cost) in neighbors {
                assert_eq!(costs[neighbor].get(node), Some(cost), "{} <-> {}", node, neighbor);
            }
        }
    }

    #[test]
    fn test_load_from_file() {
        let temp_file = write_temp(TRIANGLE);

        let config = NetworkConfig::load_from_file(temp_file.path()).unwrap();
        let nodes = config.node_configs().unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].mode, RoutingMode::Flooding);
        assert_eq!(nodes[1].mode, RoutingMode::LinkState);
        assert_eq!(nodes[0].scheduler.announce_interval, Duration::from_secs(10));
        assert_eq!(nodes[0].scheduler.discovery_delay, Duration::from_secs(1));
        assert_eq!(nodes[2].neighbor_costs.get("x"), Some(&Cost::from(4)));
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let config = NetworkConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();

        assert_eq!(config.nodes.len(), 9);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_file = write_temp("nodes: [this is: not: valid");

        assert!(NetworkConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let mut config: NetworkConfig = serde_yaml::from_str(TRIANGLE).unwrap();
        let env: HashMap<&str, &str> =
            [("MESH_MODE", "lsr"), ("MESH_ANNOUNCE_INTERVAL", "2s")].into();

        config
            .apply_environment_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        let nodes = config.node_configs().unwrap();

        assert!(nodes.iter().all(|node| node.mode == RoutingMode::LinkState));
        assert_eq!(nodes[0].scheduler.announce_interval, Duration::from_secs(2));

        let bad: HashMap<&str, &str> = [("MESH_MODE", "distance-vector")].into();
        assert!(config
            .apply_environment_overrides(|key| bad.get(key).map(|v| v.to_string()))
            .is_err());
    }

    #[test]
    fn test_override_mode() {
        let mut config: NetworkConfig = serde_yaml::from_str(TRIANGLE).unwrap();
        config.override_mode(RoutingMode::Flooding);

        let nodes = config.node_configs().unwrap();
        assert!(nodes.iter().all(|node| node.mode == RoutingMode::Flooding));
    }

    #[test]
    fn test_invalid_networks() {
        let duplicate = r#"
nodes:
  - address: x
    neighbors: { y: 1 }
  - address: x
    neighbors: { y: 1 }
"#;
        let config: NetworkConfig = serde_yaml::from_str(duplicate).unwrap();
        assert!(config.node_configs().is_err());

        let self_link = r#"
nodes:
  - address: x
    neighbors: { x: 1 }
"#;
        let config: NetworkConfig = serde_yaml::from_str(self_link).unwrap();
        assert!(config.node_configs().is_err());

        let bad_timer = r#"
timers:
  announce_interval: soon
nodes:
  - address: x
"#;
        let config: NetworkConfig = serde_yaml::from_str(bad_timer).unwrap();
        assert!(config.node_configs().is_err());

        let empty: NetworkConfig = serde_yaml::from_str("nodes: []").unwrap();
        assert!(empty.node_configs().is_err());
    }

    #[test]
    fn test_unknown_neighbor_is_allowed() {
        let dangling = r#"
nodes:
  - address: x
    neighbors: { outside: 3 }
"#;
        let config: NetworkConfig = serde_yaml::from_str(dangling).unwrap();
        let nodes = config.node_configs().unwrap();

        assert_eq!(nodes[0].neighbors(), vec![NodeAddress::from("outside")]);
        assert_eq!(config.addresses().len(), 1);
    }
}
