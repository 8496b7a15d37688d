//! Per-key quota counters.
//!
//! Fixed-window counting with one-window hangover decay: when a window
//! expires the count restarts from zero but the violation tally only drops by
//! one, so a caller that kept tripping the limit recovers gradually instead
//! of being forgiven outright. Across a window boundary a caller can get up
//! to twice the nominal rate through; that leniency is accepted.

use crate::penalty;
use serde::Serialize;
use std::sync::Arc;
use tollgate_kernel::admission::{Policy, RecordStore};
use tracing::debug;

/// Quota state for one `category:address:fingerprint` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaRecord {
    /// Normalised origin address this record belongs to.
    pub address: String,
    /// Requests counted since `window_start`.
    pub count: u32,
    /// Start of the current window (epoch ms).
    pub window_start: u64,
    /// Last time any request for this key was seen (epoch ms).
    pub last_seen: u64,
    /// Consecutive-violation tally, decays by one per rolled window.
    pub violation_count: u32,
    /// Requests are rejected until this instant (epoch ms).
    pub blocked_until: Option<u64>,
}

impl QuotaRecord {
    pub fn new(address: impl Into<String>, now: u64) -> Self {
        Self {
            address: address.into(),
            count: 0,
            window_start: now,
            last_seen: now,
            violation_count: 0,
            blocked_until: None,
        }
    }

    /// `true` while a block is in force at `now`.
    pub fn is_blocked(&self, now: u64) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// Reset the window if it has expired, forgiving one violation.
    fn roll_window(&mut self, now: u64, window_ms: u64) -> bool {
        if now.saturating_sub(self.window_start) > window_ms {
            self.count = 0;
            self.window_start = now;
            self.violation_count = self.violation_count.saturating_sub(1);
            true
        } else {
            false
        }
    }

    /// Steps 2–6 of a quota check, applied in place.
    fn check_and_increment(&mut self, now: u64, policy: &Policy, suspicion: f64) -> QuotaOutcome {
        self.last_seen = now;

        if let Some(until) = self.blocked_until {
            if now < until {
                return QuotaOutcome::Blocked {
                    retry_after_ms: until - now,
                    violations: self.violation_count,
                };
            }
            debug!(address = %self.address, "block expired");
            self.blocked_until = None;
        }

        if self.roll_window(now, policy.window_ms) {
            debug!(
                address = %self.address,
                violations = self.violation_count,
                "quota window rolled"
            );
        }
        self.count = self.count.saturating_add(1);

        if self.count > policy.max_requests {
            self.violation_count = self.violation_count.saturating_add(1);
            let duration = penalty::block_duration(self.violation_count, suspicion, policy);
            self.blocked_until = Some(now.saturating_add(duration));
            return QuotaOutcome::Violation {
                retry_after_ms: duration,
                violations: self.violation_count,
            };
        }

        QuotaOutcome::Allowed {
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(self.count),
            reset_at: self.window_start.saturating_add(policy.window_ms),
        }
    }
}

/// Result of one quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    /// Counted and within quota.
    Allowed {
        limit: u32,
        remaining: u32,
        /// Epoch ms at which the current window ends.
        reset_at: u64,
    },
    /// An earlier violation's block is still in force; nothing was counted.
    Blocked { retry_after_ms: u64, violations: u32 },
    /// This request pushed the key over quota and started a new block.
    Violation { retry_after_ms: u64, violations: u32 },
}

impl QuotaOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaOutcome::Allowed { .. })
    }
}

/// Quota records keyed by tracking key.
#[derive(Clone)]
pub struct CounterStore {
    store: Arc<dyn RecordStore<QuotaRecord>>,
}

impl CounterStore {
    pub fn new(store: Arc<dyn RecordStore<QuotaRecord>>) -> Self {
        Self { store }
    }

    /// Count one request for `key` against `policy`.
    ///
    /// `suspicion` only matters when this request is a violation: it
    /// lengthens the resulting block.
    pub fn check_and_increment(
        &self,
        key: &str,
        address: &str,
        now: u64,
        policy: &Policy,
        suspicion: f64,
    ) -> QuotaOutcome {
        let mut outcome = None;
        self.store.upsert(
            key,
            &mut || QuotaRecord::new(address, now),
            &mut |record: &mut QuotaRecord| {
                outcome = Some(record.check_and_increment(now, policy, suspicion));
            },
        );
        // upsert always runs `apply`; a store that skipped it admits the request.
        outcome.unwrap_or(QuotaOutcome::Allowed {
            limit: policy.max_requests,
            remaining: policy.max_requests,
            reset_at: now.saturating_add(policy.window_ms),
        })
    }

    pub fn get(&self, key: &str) -> Option<QuotaRecord> {
        self.store.get(key)
    }

    /// Drop every record belonging to `address`, across all categories and
    /// fingerprints.
    pub fn purge_address(&self, address: &str) -> usize {
        self.store
            .sweep(&mut |_: &str, record: &QuotaRecord| record.address != address)
    }

    /// Drop records whose `last_seen` is more than `ttl_ms` before `now`.
    pub fn evict_idle(&self, now: u64, ttl_ms: u64) -> usize {
        self.store
            .sweep(&mut |_: &str, record: &QuotaRecord| {
                now.saturating_sub(record.last_seen) <= ttl_ms
            })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of distinct addresses with a block in force at `now`.
    pub fn blocked_addresses(&self, now: u64) -> usize {
        let mut blocked = std::collections::HashSet::new();
        self.store.for_each(&mut |_: &str, record: &QuotaRecord| {
            if record.is_blocked(now) {
                blocked.insert(record.address.clone());
            }
        });
        blocked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tollgate_kernel::admission::PolicyTable;

    const T0: u64 = 1_700_000_000_000;

    fn counters() -> CounterStore {
        CounterStore::new(Arc::new(MemoryStore::new()))
    }

    fn guestbook() -> Policy {
        PolicyTable::defaults().resolve("guestbook").clone()
    }

    #[test]
    fn allows_up_to_max_requests_then_blocks() {
        let c = counters();
        let p = guestbook();
        for i in 1..=5u32 {
            let outcome = c.check_and_increment("gb:a:none", "a", T0 + u64::from(i), &p, 0.0);
            assert_eq!(
                outcome,
                QuotaOutcome::Allowed {
                    limit: 5,
                    remaining: 5 - i,
                    reset_at: T0 + 1 + 60_000,
                }
            );
        }
        let sixth = c.check_and_increment("gb:a:none", "a", T0 + 10, &p, 0.0);
        // 1000 * 2^1 with no suspicion.
        assert_eq!(
            sixth,
            QuotaOutcome::Violation {
                retry_after_ms: 2_000,
                violations: 1
            }
        );
    }

    #[test]
    fn blocked_requests_are_not_counted() {
        let c = counters();
        let p = guestbook();
        for i in 0..6 {
            c.check_and_increment("k", "a", T0 + i, &p, 0.0);
        }
        let before = c.get("k").unwrap();
        let outcome = c.check_and_increment("k", "a", T0 + 500, &p, 0.0);
        assert!(matches!(outcome, QuotaOutcome::Blocked { violations: 1, .. }));
        let after = c.get("k").unwrap();
        assert_eq!(before.count, after.count);
        assert_eq!(after.last_seen, T0 + 500);
    }

    #[test]
    fn every_request_is_rejected_until_block_elapses() {
        let c = counters();
        let p = guestbook();
        for i in 0..6 {
            c.check_and_increment("k", "a", T0 + i, &p, 0.0);
        }
        let until = c.get("k").unwrap().blocked_until.unwrap();
        for t in (T0 + 6..until).step_by(97) {
            assert!(!c.check_and_increment("k", "a", t, &p, 0.0).is_allowed());
        }
    }

    #[test]
    fn expired_block_in_same_window_is_cleared_then_rechecked() {
        let c = counters();
        let p = guestbook();
        for i in 0..6 {
            c.check_and_increment("k", "a", T0 + i, &p, 0.0);
        }
        let until = c.get("k").unwrap().blocked_until.unwrap();
        // Count is still over quota inside the same window: a fresh, longer block.
        let outcome = c.check_and_increment("k", "a", until, &p, 0.0);
        assert_eq!(
            outcome,
            QuotaOutcome::Violation {
                retry_after_ms: 4_000,
                violations: 2
            }
        );
    }

    #[test]
    fn rollover_decrements_violations_by_exactly_one() {
        let c = counters();
        let p = guestbook();
        for i in 0..6 {
            c.check_and_increment("k", "a", T0 + i, &p, 0.0);
        }
        let until = c.get("k").unwrap().blocked_until.unwrap();
        c.check_and_increment("k", "a", until, &p, 0.0);
        assert_eq!(c.get("k").unwrap().violation_count, 2);

        let next_window = T0 + 5 * 60_000;
        let outcome = c.check_and_increment("k", "a", next_window, &p, 0.0);
        assert!(outcome.is_allowed());
        let record = c.get("k").unwrap();
        assert_eq!(record.violation_count, 1);
        assert_eq!(record.count, 1);
        assert_eq!(record.window_start, next_window);
        assert_eq!(record.blocked_until, None);
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let c = counters();
        let p = guestbook();
        c.check_and_increment("k", "a", T0, &p, 0.0);
        c.check_and_increment("k", "a", T0 + 60_000, &p, 0.0);
        assert_eq!(c.get("k").unwrap().count, 2);
        c.check_and_increment("k", "a", T0 + 60_001, &p, 0.0);
        assert_eq!(c.get("k").unwrap().count, 1);
    }

    #[test]
    fn suspicion_lengthens_the_block() {
        let c = counters();
        let p = guestbook();
        for i in 0..5 {
            c.check_and_increment("k", "a", T0 + i, &p, 0.0);
        }
        let outcome = c.check_and_increment("k", "a", T0 + 5, &p, 60.0);
        // 2000 + 60/100*5000
        assert_eq!(
            outcome,
            QuotaOutcome::Violation {
                retry_after_ms: 5_000,
                violations: 1
            }
        );
    }

    #[test]
    fn purge_address_removes_all_categories_for_that_address() {
        let c = counters();
        let p = guestbook();
        c.check_and_increment("rsvp:a:none", "a", T0, &p, 0.0);
        c.check_and_increment("guestbook:a:fp1", "a", T0, &p, 0.0);
        c.check_and_increment("rsvp:b:none", "b", T0, &p, 0.0);
        assert_eq!(c.purge_address("a"), 2);
        assert_eq!(c.len(), 1);
        assert!(c.get("rsvp:b:none").is_some());
    }

    #[test]
    fn evict_idle_uses_last_seen() {
        let c = counters();
        let p = guestbook();
        let ttl = 30 * 60_000;
        c.check_and_increment("old", "a", T0, &p, 0.0);
        c.check_and_increment("fresh", "b", T0 + 2 * 60_000, &p, 0.0);
        let now = T0 + 31 * 60_000;
        assert_eq!(c.evict_idle(now, ttl), 1);
        assert!(c.get("old").is_none());
        assert!(c.get("fresh").is_some());
    }

    #[test]
    fn blocked_addresses_counts_distinct_addresses() {
        let c = counters();
        let p = guestbook();
        for key in ["rsvp:a:none", "guestbook:a:none"] {
            for i in 0..6 {
                c.check_and_increment(key, "a", T0 + i, &p, 0.0);
            }
        }
        c.check_and_increment("rsvp:b:none", "b", T0, &p, 0.0);
        assert_eq!(c.blocked_addresses(T0 + 10), 1);
        assert_eq!(c.blocked_addresses(T0 + 10 * 60_000), 0);
    }
}
