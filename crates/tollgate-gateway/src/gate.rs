//! The admission gate.
//!
//! [`AdmissionGate::admit`] is the single decision point of the system. For
//! every request it:
//!
//! 1. resolves the caller [`Identity`](crate::identity::Identity),
//! 2. runs the behaviour analyzer (rejected requests included),
//! 3. counts the request against the category quota, handing the fresh
//!    suspicion score to the penalty calculator,
//! 4. maps the outcome onto an [`AdmissionDecision`].
//!
//! ```text
//!            quota ok, score ≤ threshold
//!   ┌──────────────────────────────────────┐
//!   ▼                                      │
//! Open ──quota ok, score > threshold──► Throttled
//!   │                                      │
//!   └────────────quota exceeded────────────┴──► Blocked ──block elapsed──► Recovering
//!                                                                       (next request
//!                                                                        re-evaluated)
//! ```
//!
//! `admit` never sleeps; a throttled decision carries the delay and the
//! caller suspends only that request.

use crate::behavior::{BehaviorAnalyzer, BehaviorRecord};
use crate::identity::{normalize_address, IdentityResolver};
use crate::quota::{CounterStore, QuotaOutcome, QuotaRecord};
use crate::store::MemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tollgate_kernel::admission::{
    AdmissionConfig, AdmissionError, GateTuning, GatewayRequest, PolicyTable, RecordStore,
    DEFAULT_CATEGORY,
};
use tollgate_kernel::Clock;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Decisions
// ─────────────────────────────────────────────────────────────────────────────

/// Quota figures reported to admitted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch ms at which the current window ends.
    pub reset_at: u64,
}

/// Details of a rejected request.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNotice {
    /// Category whose policy rejected the request.
    pub category: String,
    /// The category's rejection message.
    pub message: String,
    /// Remaining block time in milliseconds.
    pub retry_after_ms: u64,
    /// Remaining block time rounded up to whole seconds, at least 1.
    pub retry_after_secs: u64,
    pub violations: u32,
    pub suspicion: f64,
    /// `true` when this very request triggered the block.
    pub newly_blocked: bool,
}

/// Outcome of [`AdmissionGate::admit`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    /// Admit immediately.
    Open { allowance: Allowance, suspicion: f64 },
    /// Admit after `delay`.
    Throttled {
        allowance: Allowance,
        delay: Duration,
        suspicion: f64,
    },
    /// Reject with 429.
    Blocked(BlockNotice),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, AdmissionDecision::Blocked(_))
    }

    pub fn allowance(&self) -> Option<&Allowance> {
        match self {
            AdmissionDecision::Open { allowance, .. }
            | AdmissionDecision::Throttled { allowance, .. } => Some(allowance),
            AdmissionDecision::Blocked(_) => None,
        }
    }

    pub fn suspicion(&self) -> f64 {
        match self {
            AdmissionDecision::Open { suspicion, .. }
            | AdmissionDecision::Throttled { suspicion, .. } => *suspicion,
            AdmissionDecision::Blocked(notice) => notice.suspicion,
        }
    }
}

/// `Retry-After` seconds for a remaining block of `ms`.
pub fn retry_after_secs(ms: u64) -> u64 {
    ms.div_ceil(1_000).max(1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Introspection
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of the gate's tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStats {
    /// Live quota records.
    pub active_records: usize,
    /// Distinct addresses with a block in force.
    pub blocked_addresses: usize,
    /// Live behaviour records.
    pub behavior_records: usize,
    /// Addresses whose decayed suspicion exceeds the throttle threshold.
    pub high_suspicion_count: usize,
}

/// What [`AdmissionGate::clear_record`] removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedRecords {
    pub address: String,
    pub quota_records: usize,
    pub behavior_record: bool,
}

/// Evictions performed by one idle sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub quota_records: usize,
    pub behavior_records: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.quota_records + self.behavior_records
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AdmissionGate
// ─────────────────────────────────────────────────────────────────────────────

/// Admission decision engine shared by every request handler.
pub struct AdmissionGate {
    policies: PolicyTable,
    tuning: GateTuning,
    identity: IdentityResolver,
    counters: CounterStore,
    analyzer: BehaviorAnalyzer,
    clock: Arc<dyn Clock>,
}

impl AdmissionGate {
    /// Validate `config` and build a gate over in-memory stores.
    pub fn new(
        config: AdmissionConfig,
        identity: IdentityResolver,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AdmissionError> {
        Self::with_stores(
            config,
            identity,
            clock,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Validate `config` and build a gate over caller-supplied stores.
    pub fn with_stores(
        config: AdmissionConfig,
        identity: IdentityResolver,
        clock: Arc<dyn Clock>,
        quota_store: Arc<dyn RecordStore<QuotaRecord>>,
        behavior_store: Arc<dyn RecordStore<BehaviorRecord>>,
    ) -> Result<Self, AdmissionError> {
        config.validate()?;
        info!(
            categories = config.policies.categories().count(),
            throttle_threshold = config.gate.throttle_threshold,
            "admission gate ready"
        );
        Ok(Self {
            policies: config.policies,
            tuning: config.gate,
            identity,
            counters: CounterStore::new(quota_store),
            analyzer: BehaviorAnalyzer::new(behavior_store, config.analyzer),
            clock,
        })
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn tuning(&self) -> &GateTuning {
        &self.tuning
    }

    /// Decide whether `req`, classified as `category`, may proceed.
    pub fn admit(&self, req: &GatewayRequest, category: &str) -> AdmissionDecision {
        let now = self.clock.now_millis();
        let category = if self.policies.contains(category) {
            category
        } else {
            DEFAULT_CATEGORY
        };
        let policy = self.policies.resolve(category);
        let identity = self.identity.resolve(req, category);

        let suspicion =
            self.analyzer
                .score(&identity.address, now, &req.path, req.header("user-agent"));

        let outcome =
            self.counters
                .check_and_increment(&identity.key, &identity.address, now, policy, suspicion);

        match outcome {
            QuotaOutcome::Allowed {
                limit,
                remaining,
                reset_at,
            } => {
                let allowance = Allowance {
                    limit,
                    remaining,
                    reset_at,
                };
                if suspicion > self.tuning.throttle_threshold {
                    let delay = self.throttle_delay(suspicion);
                    debug!(
                        key = %identity.key,
                        suspicion,
                        delay_ms = delay.as_millis() as u64,
                        "throttling suspicious caller"
                    );
                    AdmissionDecision::Throttled {
                        allowance,
                        delay,
                        suspicion,
                    }
                } else {
                    AdmissionDecision::Open {
                        allowance,
                        suspicion,
                    }
                }
            }
            QuotaOutcome::Blocked {
                retry_after_ms,
                violations,
            }
            | QuotaOutcome::Violation {
                retry_after_ms,
                violations,
            } => {
                let newly_blocked = matches!(outcome, QuotaOutcome::Violation { .. });
                if newly_blocked {
                    warn!(
                        key = %identity.key,
                        category,
                        violations,
                        suspicion,
                        block_ms = retry_after_ms,
                        "quota exceeded, caller blocked"
                    );
                }
                AdmissionDecision::Blocked(BlockNotice {
                    category: category.to_string(),
                    message: policy.rejection_message.clone(),
                    retry_after_ms,
                    retry_after_secs: retry_after_secs(retry_after_ms),
                    violations,
                    suspicion,
                    newly_blocked,
                })
            }
        }
    }

    fn throttle_delay(&self, suspicion: f64) -> Duration {
        let cap = self.tuning.max_throttle_delay_ms;
        let raw = suspicion * self.tuning.throttle_ms_per_point;
        let ms = if raw.is_finite() {
            raw.clamp(0.0, cap as f64) as u64
        } else {
            cap
        };
        Duration::from_millis(ms)
    }

    /// Current tracked-state counters.
    pub fn stats(&self) -> AdmissionStats {
        let now = self.clock.now_millis();
        AdmissionStats {
            active_records: self.counters.len(),
            blocked_addresses: self.counters.blocked_addresses(now),
            behavior_records: self.analyzer.len(),
            high_suspicion_count: self
                .analyzer
                .count_above(self.tuning.throttle_threshold, now),
        }
    }

    /// Forget everything known about `address`: every quota record across
    /// categories and fingerprints, plus its behaviour record.
    pub fn clear_record(&self, address: &str) -> ClearedRecords {
        let address = normalize_address(Some(address));
        let quota_records = self.counters.purge_address(&address);
        let behavior_record = self.analyzer.forget(&address);
        info!(%address, quota_records, behavior_record, "admission records cleared");
        ClearedRecords {
            address,
            quota_records,
            behavior_record,
        }
    }

    /// Evict records idle for longer than the configured TTL.
    pub fn sweep_idle(&self) -> SweepReport {
        let now = self.clock.now_millis();
        let ttl = self.tuning.idle_ttl_ms;
        SweepReport {
            quota_records: self.counters.evict_idle(now, ttl),
            behavior_records: self.analyzer.evict_idle(now, ttl),
        }
    }

    /// Decayed suspicion of `address` right now.
    pub fn suspicion_of(&self, address: &str) -> f64 {
        self.analyzer
            .current_score(&normalize_address(Some(address)), self.clock.now_millis())
    }
}
