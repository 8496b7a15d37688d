//! Admission configuration container and startup validation.
//!
//! [`AdmissionConfig`] aggregates the policy table, the category routes and
//! the tuning knobs of the gate and the behaviour analyzer, and exposes a
//! single [`validate()`](AdmissionConfig::validate) that checks every
//! structural invariant *before* any request is admitted.

use super::error::AdmissionError;
use super::policy::PolicyTable;
use super::router::RouteConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ─────────────────────────────────────────────────────────────────────────────
// GateTuning
// ─────────────────────────────────────────────────────────────────────────────

/// Upper bound on the artificial delay of a throttled request.
pub const MAX_THROTTLE_DELAY_MS: u64 = 2_000;

/// Throttling and housekeeping parameters of the admission gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateTuning {
    /// Suspicion score above which admitted requests are delayed.
    pub throttle_threshold: f64,
    /// Delay per suspicion point, in milliseconds.
    pub throttle_ms_per_point: f64,
    /// Cap on the artificial delay, at most [`MAX_THROTTLE_DELAY_MS`].
    pub max_throttle_delay_ms: u64,
    /// Records idle for longer than this are evicted by the reaper.
    pub idle_ttl_ms: u64,
    /// Interval between reaper sweeps.
    pub reap_interval_ms: u64,
}

impl Default for GateTuning {
    fn default() -> Self {
        Self {
            throttle_threshold: 50.0,
            throttle_ms_per_point: 10.0,
            max_throttle_delay_ms: MAX_THROTTLE_DELAY_MS,
            idle_ttl_ms: 30 * 60 * 1_000,
            reap_interval_ms: 5 * 60 * 1_000,
        }
    }
}

impl GateTuning {
    fn validate(&self) -> Result<(), AdmissionError> {
        for (field, value) in [
            ("throttle_threshold", self.throttle_threshold),
            ("throttle_ms_per_point", self.throttle_ms_per_point),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AdmissionError::InvalidThrottle(field, value.to_string()));
            }
        }
        if self.max_throttle_delay_ms > MAX_THROTTLE_DELAY_MS {
            return Err(AdmissionError::InvalidThrottle(
                "max_throttle_delay_ms",
                format!("{} exceeds {MAX_THROTTLE_DELAY_MS}", self.max_throttle_delay_ms),
            ));
        }
        if self.idle_ttl_ms == 0 {
            return Err(AdmissionError::InvalidInterval("idle_ttl_ms"));
        }
        if self.reap_interval_ms == 0 {
            return Err(AdmissionError::InvalidInterval("reap_interval_ms"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AnalyzerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Heuristic thresholds of the behaviour analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Timestamps kept per address.
    pub history_len: usize,
    /// Look-back used by the burst check.
    pub burst_window_ms: u64,
    /// More than this many requests in the burst window adds `burst_high_penalty`.
    pub burst_high_count: usize,
    pub burst_high_penalty: f64,
    /// More than this many (and not high) adds `burst_low_penalty`.
    pub burst_low_count: usize,
    pub burst_low_penalty: f64,
    /// Most recent timestamps considered by the regularity check.
    pub regularity_sample: usize,
    /// Fewer timestamps than this skip the regularity check.
    pub regularity_min_samples: usize,
    pub regularity_max_std_ms: f64,
    pub regularity_max_mean_ms: f64,
    pub regularity_penalty: f64,
    /// User agents shorter than this are treated as missing.
    pub min_user_agent_len: usize,
    pub user_agent_penalty: f64,
    /// Inactivity after which the score has decayed to zero.
    pub decay_window_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            history_len: 100,
            burst_window_ms: 1_000,
            burst_high_count: 10,
            burst_high_penalty: 30.0,
            burst_low_count: 5,
            burst_low_penalty: 15.0,
            regularity_sample: 10,
            regularity_min_samples: 5,
            regularity_max_std_ms: 50.0,
            regularity_max_mean_ms: 500.0,
            regularity_penalty: 25.0,
            min_user_agent_len: 10,
            user_agent_penalty: 10.0,
            decay_window_ms: 300_000,
        }
    }
}

impl AnalyzerConfig {
    fn validate(&self) -> Result<(), AdmissionError> {
        if self.decay_window_ms == 0 {
            return Err(AdmissionError::InvalidInterval("decay_window_ms"));
        }
        if self.burst_window_ms == 0 {
            return Err(AdmissionError::InvalidInterval("burst_window_ms"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AdmissionConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level admission configuration.
///
/// Call [`validate()`](Self::validate) to check all structural invariants
/// before handing this config to the gate.
#[derive(Debug, Clone, Default)]
pub struct AdmissionConfig {
    /// Per-category policies.
    pub policies: PolicyTable,
    /// Path → category table.
    pub routes: Vec<RouteConfig>,
    /// Throttle and reaper parameters.
    pub gate: GateTuning,
    /// Behaviour heuristics.
    pub analyzer: AnalyzerConfig,
}

impl AdmissionConfig {
    /// Construct a config over `policies` with default tuning and no routes.
    pub fn new(policies: PolicyTable) -> Self {
        Self {
            policies,
            ..Self::default()
        }
    }

    /// Builder: add a route.
    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    /// Builder: replace the gate tuning.
    pub fn with_gate(mut self, gate: GateTuning) -> Self {
        self.gate = gate;
        self
    }

    /// Builder: replace the analyzer thresholds.
    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate all structural invariants of this configuration.
    ///
    /// Returns the *first* detected [`AdmissionError`].
    ///
    /// Checks performed (in order):
    /// 1. The policy table has a `default` entry and every policy is sane.
    /// 2. Throttle figures are finite and non-negative, the delay cap is at
    ///    most [`MAX_THROTTLE_DELAY_MS`], and gate intervals are non-zero.
    /// 3. Analyzer windows are non-zero.
    /// 4. Each route passes its own [`RouteConfig::validate()`] check.
    /// 5. No two routes share the same id.
    /// 6. Every route's category exists in the policy table.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        // ── 1. Policies ──────────────────────────────────────────────────────
        self.policies.validate()?;

        // ── 2 + 3. Tuning ────────────────────────────────────────────────────
        self.gate.validate()?;
        self.analyzer.validate()?;

        // ── 4 + 5 + 6. Routes ────────────────────────────────────────────────
        let mut route_ids: HashSet<&str> = HashSet::new();
        for route in &self.routes {
            route.validate()?;
            if !route_ids.insert(route.id.as_str()) {
                return Err(AdmissionError::DuplicateRoute(route.id.clone()));
            }
            if !self.policies.contains(&route.category) {
                return Err(AdmissionError::UnknownCategory(
                    route.id.clone(),
                    route.category.clone(),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
