//! Startup discovery and periodic re-announcement timers

use mesh_routing::RoutingMode;
use mesh_topology::DEFAULT_RECORD_MAX_AGE;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};

/// Timer settings for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Delay between start and the neighbor discovery echoes
    pub discovery_delay: Duration,
    /// Period of link-state re-announcement
    pub announce_interval: Duration,
    /// Period of store and dedup aging
    pub maintenance_interval: Duration,
    /// Age after which an unrefreshed link-state record is dropped
    pub record_max_age: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discovery_delay: Duration::from_secs(1),
            announce_interval: Duration::from_secs(30),
            maintenance_interval: Duration::from_secs(60),
            record_max_age: DEFAULT_RECORD_MAX_AGE,
        }
    }
}

/// What the scheduler wants the node to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Echo every configured neighbor
    Discover,
    /// Flood the local link-state advertisement
    Announce,
    /// Age the link-state store and the dedup cache
    Maintain,
}

/// Produces [`Tick`]s for the node event loop.
///
/// [`Scheduler::next`] is cancel safe: it may be dropped inside `select!`
/// without losing a tick.
pub struct Scheduler {
    discover_at: Option<Instant>,
    announce: Option<Interval>,
    maintenance: Interval,
    announce_period: Duration,
    announces: bool,
}

impl Scheduler {
    /// Start the timers now
    pub fn new(config: &SchedulerConfig, mode: RoutingMode) -> Self {
        let now = Instant::now();
        let mut maintenance = interval_at(
            now + config.maintenance_interval,
            config.maintenance_interval,
        );
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            discover_at: Some(now + config.discovery_delay),
            announce: None,
            maintenance,
            announce_period: config.announce_interval,
            announces: mode == RoutingMode::LinkState,
        }
    }

    /// Wait for the next tick
    pub async fn next(&mut self) -> Tick {
        if let Some(at) = self.discover_at {
            tokio::time::sleep_until(at).await;
            self.discover_at = None;
            if self.announces {
                // First tick completes immediately: announce right after discovery
                let mut announce = interval(self.announce_period);
                announce.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.announce = Some(announce);
            }
            return Tick::Discover;
        }

        let announce = &mut self.announce;
        tokio::select! {
            _ = async {
                match announce {
                    Some(timer) => timer.tick().await,
                    None => std::future::pending().await,
                }
            } => Tick::Announce,
            _ = self.maintenance.tick() => Tick::Maintain,
        }
    }
}
