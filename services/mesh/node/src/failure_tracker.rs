//! Send failure tracker for detecting unreachable neighbors

use mesh_wire::NodeAddress;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tracks consecutive transport failures per neighbor
#[derive(Debug, Clone)]
pub struct SendFailureTracker {
    /// Failure state per destination
    failures: Arc<RwLock<HashMap<NodeAddress, FailureInfo>>>,
    /// Consecutive failures before a neighbor is reported unreachable
    failure_threshold: u32,
    /// Failures further apart than this start a new count
    failure_window: Duration,
}

#[derive(Debug, Clone)]
struct FailureInfo {
    /// Number of consecutive failures
    count: u32,
    /// First failure in the current run
    first_failure: Instant,
    /// Most recent failure
    last_failure: Instant,
    /// Whether the unreachable warning has been logged for this run
    reported: bool,
}

impl SendFailureTracker {
    /// Create a new tracker
    pub fn new(failure_threshold: u32, failure_window: Duration) -> Self {
        Self {
            failures: Arc::new(RwLock::new(HashMap::new())),
            failure_threshold: failure_threshold.max(1),
            failure_window,
        }
    }

    /// Record a failed send. Returns the consecutive count and whether the
    /// threshold was crossed by this failure.
    pub async fn record_failure(&self, to: &NodeAddress) -> (u32, bool) {
        let mut failures = self.failures.write().await;
        let now = Instant::now();

        let info = failures.entry(to.clone()).or_insert(FailureInfo {
            count: 0,
            first_failure: now,
            last_failure: now,
            reported: false,
        });

        if now.duration_since(info.first_failure) > self.failure_window {
            info.count = 1;
            info.first_failure = now;
            info.reported = false;
        } else {
            info.count += 1;
        }
        info.last_failure = now;

        let crossed = info.count >= self.failure_threshold && !info.reported;
        if crossed {
            info.reported = true;
            warn!("Neighbor {} unreachable after {} failed sends", to, info.count);
        }

        debug!("Recorded send failure to {} (count: {})", to, info.count);
        (info.count, crossed)
    }

    /// Record a successful send. Returns true if the neighbor had been reported unreachable.
    pub async fn record_success(&self, to: &NodeAddress) -> bool {
        let mut failures = self.failures.write().await;
        match failures.remove(to) {
            Some(info) if info.reported => {
                info!("Neighbor {} reachable again", to);
                true
            }
            _ => false,
        }
    }

    /// Current consecutive failure count for `to`
    pub async fn failure_count(&self, to: &NodeAddress) -> u32 {
        let failures = self.failures.read().await;
        failures.get(to).map(|info| info.count).unwrap_or(0)
    }

    /// Whether `to` is currently reported unreachable
    pub async fn is_unreachable(&self, to: &NodeAddress) -> bool {
        let failures = self.failures.read().await;
        failures.get(to).map(|info| info.reported).unwrap_or(false)
    }

    /// Forget failure runs that ended long ago
    pub async fn cleanup_old_failures(&self) -> usize {
        let mut failures = self.failures.write().await;
        let now = Instant::now();
        let before = failures.len();
        failures.retain(|_, info| now.duration_since(info.last_failure) < self.failure_window * 2);
        before - failures.len()
    }
}
