//! Read-path cache for unread listings and assembled threads.
//!
//! Entries are keyed by a query fingerprint and dropped by the write paths
//! after they commit. A global generation counter closes the race between a
//! reader filling the cache and a writer invalidating it: a result computed
//! before an invalidation is never kept.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parley_types::models::{ThreadNode, UnreadMessage};
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Unread(Uuid),
    Thread(Uuid),
}

#[derive(Clone)]
enum Cached {
    Unread(Arc<Vec<UnreadMessage>>),
    Thread(Arc<ThreadNode>),
}

pub struct QueryCache {
    entries: DashMap<QueryKey, Cached>,
    capacity: usize,
    generation: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            generation: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot to take before running the query whose result will be cached.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn get_unread(&self, key: &QueryKey) -> Option<Arc<Vec<UnreadMessage>>> {
        match self.entries.get(key).map(|e| e.value().clone()) {
            Some(Cached::Unread(rows)) => {
                trace!(?key, "cache hit");
                Some(rows)
            }
            _ => None,
        }
    }

    pub(crate) fn get_thread(&self, key: &QueryKey) -> Option<Arc<ThreadNode>> {
        match self.entries.get(key).map(|e| e.value().clone()) {
            Some(Cached::Thread(node)) => {
                trace!(?key, "cache hit");
                Some(node)
            }
            _ => None,
        }
    }

    pub(crate) fn put_unread(
        &self,
        key: QueryKey,
        rows: Vec<UnreadMessage>,
        generation: u64,
    ) -> Arc<Vec<UnreadMessage>> {
        let rows = Arc::new(rows);
        self.put(key, Cached::Unread(rows.clone()), generation);
        rows
    }

    pub(crate) fn put_thread(&self, key: QueryKey, node: ThreadNode, generation: u64) -> Arc<ThreadNode> {
        let node = Arc::new(node);
        self.put(key, Cached::Thread(node.clone()), generation);
        node
    }

    fn put(&self, key: QueryKey, value: Cached, generation: u64) {
        if self.capacity == 0 || self.generation() != generation {
            return;
        }
        if self.len() >= self.capacity && !self.contains(&key) {
            // Arbitrary victim; a miss just re-runs the query.
            let victim = self.entries.iter().next().map(|e| *e.key());
            if let Some(victim) = victim {
                trace!(?key, ?victim, "cache full, evicting");
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key, value);
        // An invalidation may have run between the check above and the insert.
        if self.generation() != generation {
            self.entries.remove(&key);
        }
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn invalidate_unread(&self, user_id: Uuid) {
        self.bump();
        self.entries.remove(&QueryKey::Unread(user_id));
    }

    pub fn invalidate_threads(&self) {
        self.bump();
        self.entries.retain(|k, _| !matches!(k, QueryKey::Thread(_)));
    }

    pub fn clear(&self) {
        self.bump();
        self.entries.clear();
        debug!("query cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_generation_is_not_stored() {
        let cache = QueryCache::new(8);
        let key = QueryKey::Unread(Uuid::new_v4());

        let generation = cache.generation();
        cache.invalidate_unread(Uuid::new_v4());
        cache.put_unread(key, vec![], generation);
        assert!(!cache.contains(&key));

        cache.put_unread(key, vec![], cache.generation());
        assert!(cache.get_unread(&key).is_some());
    }

    #[test]
    fn full_cache_evicts_to_admit_new_keys() {
        let cache = QueryCache::new(2);
        let keys: Vec<QueryKey> = (0..5).map(|_| QueryKey::Unread(Uuid::new_v4())).collect();

        for key in &keys {
            cache.put_unread(*key, vec![], cache.generation());
            assert!(cache.contains(key));
            assert!(cache.len() <= 2);
        }
        assert_eq!(cache.len(), 2);

        // Refreshing a cached key does not evict anything.
        let last = keys[4];
        cache.put_unread(last, vec![], cache.generation());
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&last));
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = QueryCache::new(0);
        let key = QueryKey::Unread(Uuid::new_v4());
        cache.put_unread(key, vec![], cache.generation());
        assert!(cache.is_empty());
    }

    #[test]
    fn thread_invalidation_keeps_unread_entries() {
        let cache = QueryCache::new(8);
        let unread = QueryKey::Unread(Uuid::new_v4());
        let thread = QueryKey::Thread(Uuid::new_v4());
        let generation = cache.generation();
        cache.put_unread(unread, vec![], generation);
        cache.entries.insert(thread, Cached::Unread(Arc::new(vec![])));

        cache.invalidate_threads();
        assert!(cache.contains(&unread));
        assert!(!cache.contains(&thread));
    }
}
