use crate::types::{ContainerId, StatusSnapshot};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One cached observation together with when it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub snapshot: StatusSnapshot,
    pub fetched_at: DateTime<Utc>,
}

/// Immutable copy of the whole cache, published once per sweep for
/// consumers that want a non-blocking read of all statuses at once.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSnapshot {
    pub entries: HashMap<ContainerId, CacheEntry>,
    pub published_at: DateTime<Utc>,
}

impl GenerationSnapshot {
    pub fn get(&self, id: &ContainerId) -> Option<&CacheEntry> {
        self.entries.get(id)
    }
}

/// Time-indexed store of the last known status per container.
///
/// Two invariants carry the whole design:
/// - stale-retain: a failed refresh never evicts known-good data, callers
///   simply never write on failure;
/// - last-fetch-wins: a write carrying an older originating timestamp
///   than the current entry is discarded, so a slow early fetch cannot
///   clobber a fast later one.
pub struct StatusCache {
    entries: RwLock<HashMap<ContainerId, CacheEntry>>,
    generation: RwLock<Arc<GenerationSnapshot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: RwLock::new(Arc::new(GenerationSnapshot {
                entries: HashMap::new(),
                published_at: Utc::now(),
            })),
        }
    }

    pub async fn get(&self, id: &ContainerId) -> Option<CacheEntry> {
        self.entries.read().await.get(id).cloned()
    }

    /// Unconditional overwrite, except when a fresher entry already won.
    /// Returns whether the write was accepted.
    pub async fn put(&self, snapshot: StatusSnapshot, fetched_at: DateTime<Utc>) -> bool {
        let id = snapshot.id.clone();
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&id) {
            if existing.fetched_at > fetched_at {
                debug!(
                    "Discarding stale write for '{id}' ({} > {})",
                    existing.fetched_at, fetched_at
                );
                return false;
            }
        }

        entries.insert(
            id,
            CacheEntry {
                snapshot,
                fetched_at,
            },
        );
        true
    }

    /// Age of the entry for `id`, or `None` when nothing was ever cached
    /// (absent reads as infinitely stale).
    pub async fn staleness(&self, id: &ContainerId, now: DateTime<Utc>) -> Option<Duration> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| now - entry.fetched_at)
    }

    /// Publish an immutable copy of the current cache state.
    pub async fn publish_generation(&self, now: DateTime<Utc>) -> Arc<GenerationSnapshot> {
        let copy = self.entries.read().await.clone();
        let generation = Arc::new(GenerationSnapshot {
            entries: copy,
            published_at: now,
        });
        *self.generation.write().await = Arc::clone(&generation);
        generation
    }

    /// The most recently published generation.
    pub async fn generation(&self) -> Arc<GenerationSnapshot> {
        Arc::clone(&*self.generation.read().await)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn snapshot(id: &str, running: bool) -> StatusSnapshot {
        StatusSnapshot {
            id: ContainerId::from(id),
            running,
            cpu: crate::types::ResourceReading::Unavailable,
            memory: crate::types::ResourceReading::Unavailable,
            uptime: None,
            details_allowed: true,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = StatusCache::new();
        let now = Utc::now();
        assert!(cache.put(snapshot("web", true), now).await);

        let entry = cache.get(&ContainerId::from("web")).await.unwrap();
        assert!(entry.snapshot.running);
        assert_eq!(entry.fetched_at, now);
    }

    #[tokio::test]
    async fn older_write_is_discarded() {
        let cache = StatusCache::new();
        let id = ContainerId::from("web");
        let now = Utc::now();

        assert!(cache.put(snapshot("web", true), now).await);
        // A fetch that started earlier but completed later must lose.
        assert!(
            !cache
                .put(snapshot("web", false), now - TimeDelta::seconds(10))
                .await
        );

        assert!(cache.get(&id).await.unwrap().snapshot.running);
    }

    #[tokio::test]
    async fn staleness_is_infinite_when_absent() {
        let cache = StatusCache::new();
        assert!(
            cache
                .staleness(&ContainerId::from("ghost"), Utc::now())
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn staleness_grows_with_time() {
        let cache = StatusCache::new();
        let fetched = Utc::now();
        cache.put(snapshot("web", true), fetched).await;

        let age = cache
            .staleness(&ContainerId::from("web"), fetched + TimeDelta::seconds(90))
            .await
            .unwrap();
        assert_eq!(age.num_seconds(), 90);
    }

    #[tokio::test]
    async fn generation_is_a_frozen_copy() {
        let cache = StatusCache::new();
        let now = Utc::now();
        cache.put(snapshot("web", true), now).await;
        let generation = cache.publish_generation(now).await;

        // Later writes must not show up in an already-published generation.
        cache.put(snapshot("web", false), now + TimeDelta::seconds(5)).await;

        assert!(
            generation
                .get(&ContainerId::from("web"))
                .unwrap()
                .snapshot
                .running
        );
    }
}
