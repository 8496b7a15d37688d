//! Record store contract.
//!
//! Both the quota counters and the behaviour records live behind
//! [`RecordStore`]. The in-memory implementation in `tollgate-gateway` is
//! process-local; a shared backing store (and with it cross-instance quotas)
//! can be slotted in without touching the gate.

/// Keyed storage for admission records.
///
/// `upsert` is the only read-modify-write entry point and must be atomic per
/// key: two concurrent upserts on the same key never interleave.
pub trait RecordStore<V>: Send + Sync
where
    V: Clone + Send + Sync,
{
    /// Snapshot of the record stored under `key`.
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace the record under `key`.
    fn set(&self, key: &str, value: V);

    /// Remove and return the record under `key`.
    fn delete(&self, key: &str) -> Option<V>;

    /// Apply `apply` to the record under `key`, creating it with `init` first
    /// when absent. Runs under the key's lock.
    fn upsert(&self, key: &str, init: &mut dyn FnMut() -> V, apply: &mut dyn FnMut(&mut V));

    /// Remove every record for which `keep` returns `false` and report how
    /// many were removed. Implementations must not hold a lock across the
    /// whole sweep; records touched concurrently are re-checked before removal.
    fn sweep(&self, keep: &mut dyn FnMut(&str, &V) -> bool) -> usize;

    /// Read-only visit of every record (used for statistics).
    fn for_each(&self, visit: &mut dyn FnMut(&str, &V));

    /// Number of stored records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
