//! In-memory deduplication backend

use crate::{Dedup, DedupConfig, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use mesh_wire::MessageId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// In-memory deduplication cache with retention aging and a size bound
pub struct MemoryDedup {
    /// Seen ids and when they were first seen
    seen: Arc<DashMap<MessageId, Instant>>,
    /// Ids in the order they were first seen. Each id in `seen` appears here exactly once.
    order: Mutex<VecDeque<(MessageId, Instant)>>,
    config: DedupConfig,
}

impl MemoryDedup {
    /// Create a new in-memory dedup cache
    pub fn new(config: DedupConfig) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            seen: Arc::new(DashMap::new()),
            order: Mutex::new(VecDeque::new()),
            config,
        })
    }

    /// Create with default retention and size bound
    pub fn with_defaults() -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            order: Mutex::new(VecDeque::new()),
            config: DedupConfig::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    fn lock_order(&self) -> Result<MutexGuard<'_, VecDeque<(MessageId, Instant)>>, StorageError> {
        self.order
            .lock()
            .map_err(|_| StorageError::Backend("dedup order lock poisoned".to_string()))
    }

    fn is_expired(&self, seen_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(seen_at) >= self.config.retention
    }

    /// Pop aged-out entries from the front of `order`
    fn expire_front(&self, order: &mut VecDeque<(MessageId, Instant)>, now: Instant) -> usize {
        let mut purged = 0;
        while let Some((_, seen_at)) = order.front() {
            if !self.is_expired(*seen_at, now) {
                break;
            }
            if let Some((id, _)) = order.pop_front() {
                self.seen.remove(&id);
                purged += 1;
            }
        }
        purged
    }
}

impl Default for MemoryDedup {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl Dedup for MemoryDedup {
    async fn check_and_mark(&self, id: &MessageId) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut order = self.lock_order()?;
        self.expire_front(&mut order, now);

        if self.seen.contains_key(id) {
            debug!("Dedup hit id={}", id);
            return Ok(false);
        }

        self.seen.insert(id.clone(), now);
        order.push_back((id.clone(), now));

        while order.len() > self.config.max_entries {
            if let Some((evicted, _)) = order.pop_front() {
                self.seen.remove(&evicted);
                debug!("Dedup evicted id={} (capacity {})", evicted, self.config.max_entries);
            }
        }

        Ok(true)
    }

    async fn contains(&self, id: &MessageId) -> Result<bool, StorageError> {
        let now = Instant::now();
        Ok(self
            .seen
            .get(id)
            .map(|seen_at| !self.is_expired(*seen_at, now))
            .unwrap_or(false))
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Instant::now();
        let mut order = self.lock_order()?;
        let purged = self.expire_front(&mut order, now);
        if purged > 0 {
            debug!("Dedup purged {} expired ids, {} remain", purged, order.len());
        }
        Ok(purged)
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.seen.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> MessageId {
        MessageId::new(s)
    }

    #[tokio::test]
    async fn test_memory_dedup_basic() {
        let dedup = MemoryDedup::with_defaults();

        assert!(!dedup.contains(&id("m-1")).await.unwrap());
        assert!(dedup.check_and_mark(&id("m-1")).await.unwrap());
        assert!(!dedup.check_and_mark(&id("m-1")).await.unwrap());
        assert!(dedup.contains(&id("m-1")).await.unwrap());

        assert!(dedup.check_and_mark(&id("m-2")).await.unwrap());
        assert_eq!(dedup.len().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_dedup_retention() {
        let dedup = MemoryDedup::new(DedupConfig {
            retention: Duration::from_secs(60),
            max_entries: 16,
        })
        .unwrap();

        dedup.check_and_mark(&id("old")).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        dedup.check_and_mark(&id("new")).await.unwrap();
        assert_eq!(dedup.purge_expired().await.unwrap(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!dedup.contains(&id("old")).await.unwrap());
        assert_eq!(dedup.purge_expired().await.unwrap(), 1);
        assert_eq!(dedup.len().await.unwrap(), 1);
        assert!(dedup.contains(&id("new")).await.unwrap());

        // An aged-out id is accepted again
        assert!(dedup.check_and_mark(&id("old")).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_dedup_evicts_oldest() {
        let dedup = MemoryDedup::new(DedupConfig {
            retention: Duration::from_secs(60),
            max_entries: 2,
        })
        .unwrap();

        dedup.check_and_mark(&id("a")).await.unwrap();
        dedup.check_and_mark(&id("b")).await.unwrap();
        dedup.check_and_mark(&id("c")).await.unwrap();

        assert_eq!(dedup.len().await.unwrap(), 2);
        assert!(!dedup.contains(&id("a")).await.unwrap());
        assert!(dedup.contains(&id("b")).await.unwrap());
        assert!(dedup.contains(&id("c")).await.unwrap());
    }

    #[test]
    fn test_memory_dedup_rejects_invalid_config() {
        let result = MemoryDedup::new(DedupConfig {
            retention: Duration::from_secs(1),
            max_entries: 0,
        });
        assert!(matches!(result, Err(StorageError::Invalid(_))));
    }
}
