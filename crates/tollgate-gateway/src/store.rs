//! In-memory [`RecordStore`] backed by a sharded concurrent map.
//!
//! `DashMap` locks one shard per operation, so the read-modify-write done in
//! [`upsert`](RecordStore::upsert) is atomic per key while unrelated keys in
//! other shards proceed in parallel.

use dashmap::DashMap;
use tollgate_kernel::admission::RecordStore;

/// Process-local record store.
#[derive(Debug)]
pub struct MemoryStore<V> {
    records: DashMap<String, V>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V> RecordStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        self.records.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, value: V) {
        self.records.insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> Option<V> {
        self.records.remove(key).map(|(_, v)| v)
    }

    fn upsert(&self, key: &str, init: &mut dyn FnMut() -> V, apply: &mut dyn FnMut(&mut V)) {
        // Fast path: existing keys need no owned key allocation.
        if let Some(mut existing) = self.records.get_mut(key) {
            apply(existing.value_mut());
            return;
        }
        let mut entry = self.records.entry(key.to_string()).or_insert_with(|| init());
        apply(entry.value_mut());
    }

    fn sweep(&self, keep: &mut dyn FnMut(&str, &V) -> bool) -> usize {
        // Collect first: removing while an iterator guard is alive would
        // deadlock on the shard.
        let stale: Vec<String> = self
            .records
            .iter()
            .filter(|r| !keep(r.key(), r.value()))
            .map(|r| r.key().clone())
            .collect();

        stale
            .iter()
            .filter(|key| self.records.remove_if(key.as_str(), |k, v| !keep(k, v)).is_some())
            .count()
    }

    fn for_each(&self, visit: &mut dyn FnMut(&str, &V)) {
        for r in self.records.iter() {
            visit(r.key(), r.value());
        }
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
