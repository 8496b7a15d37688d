//! Behavioural suspicion scoring.
//!
//! One [`BehaviorRecord`] per origin address, shared by every category. Each
//! request adds a suspicion delta made of three heuristics:
//!
//! | Signal | Rule | Delta |
//! |--------|------|-------|
//! | Burst | more than 10 requests in the last second | +30 |
//! |       | more than 5 requests in the last second  | +15 |
//! | Regularity | at least 5 timestamps among the last 10, intervals with std-dev < 50 ms and mean < 500 ms | +25 |
//! | Identity | user-agent missing or shorter than 10 chars | +10 |
//!
//! The running score decays linearly to zero over five minutes of silence
//! before the delta is merged, and never drops below zero.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tollgate_kernel::admission::{AnalyzerConfig, RecordStore};
use tracing::trace;

/// Behaviour history of one origin address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorRecord {
    /// Most recent request timestamps, oldest first.
    pub timestamps: VecDeque<u64>,
    /// Visits per request path.
    pub paths: HashMap<String, u32>,
    /// Last user-agent seen from this address.
    pub user_agent: Option<String>,
    /// Decaying suspicion estimate, always `>= 0`.
    pub suspicion_score: f64,
    /// When the score was last updated (epoch ms).
    pub last_analysis: u64,
}

impl BehaviorRecord {
    pub fn new(now: u64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            paths: HashMap::new(),
            user_agent: None,
            suspicion_score: 0.0,
            last_analysis: now,
        }
    }

    /// Score as it stands at `now` without recording anything.
    pub fn decayed_score(&self, now: u64, cfg: &AnalyzerConfig) -> f64 {
        self.suspicion_score * decay_factor(now.saturating_sub(self.last_analysis), cfg)
    }

    /// Record one request and return the merged score.
    pub fn observe(
        &mut self,
        now: u64,
        path: &str,
        user_agent: Option<&str>,
        cfg: &AnalyzerConfig,
    ) -> f64 {
        self.timestamps.push_back(now);
        while self.timestamps.len() > cfg.history_len.max(1) {
            self.timestamps.pop_front();
        }
        *self.paths.entry(path.to_string()).or_insert(0) += 1;
        if let Some(ua) = user_agent {
            self.user_agent = Some(ua.to_string());
        }

        let burst = burst_delta(&self.timestamps, now, cfg);
        let regularity = regularity_delta(&self.timestamps, cfg);
        let identity = identity_delta(user_agent, cfg);
        let delta = burst + regularity + identity;

        let decayed = self.decayed_score(now, cfg);
        self.suspicion_score = (decayed + delta).max(0.0);
        self.last_analysis = now;

        trace!(
            burst,
            regularity,
            identity,
            score = self.suspicion_score,
            "behaviour analysed"
        );
        self.suspicion_score
    }
}

/// `max(0, 1 - elapsed / decay_window)`.
fn decay_factor(elapsed_ms: u64, cfg: &AnalyzerConfig) -> f64 {
    let window = cfg.decay_window_ms.max(1) as f64;
    (1.0 - elapsed_ms as f64 / window).max(0.0)
}

fn burst_delta(timestamps: &VecDeque<u64>, now: u64, cfg: &AnalyzerConfig) -> f64 {
    let recent = timestamps
        .iter()
        .rev()
        .take_while(|&&t| now.saturating_sub(t) < cfg.burst_window_ms)
        .count();
    if recent > cfg.burst_high_count {
        cfg.burst_high_penalty
    } else if recent > cfg.burst_low_count {
        cfg.burst_low_penalty
    } else {
        0.0
    }
}

fn regularity_delta(timestamps: &VecDeque<u64>, cfg: &AnalyzerConfig) -> f64 {
    let take = cfg.regularity_sample.min(timestamps.len());
    if take < cfg.regularity_min_samples.max(2) {
        return 0.0;
    }
    let sample: Vec<f64> = timestamps
        .iter()
        .skip(timestamps.len() - take)
        .map(|&t| t as f64)
        .collect();
    let intervals: Vec<f64> = sample.windows(2).map(|w| w[1] - w[0]).collect();

    let n = intervals.len() as f64;
    let mean = intervals.iter().sum::<f64>() / n;
    let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev < cfg.regularity_max_std_ms && mean < cfg.regularity_max_mean_ms {
        cfg.regularity_penalty
    } else {
        0.0
    }
}

fn identity_delta(user_agent: Option<&str>, cfg: &AnalyzerConfig) -> f64 {
    match user_agent {
        Some(ua) if ua.chars().count() >= cfg.min_user_agent_len => 0.0,
        _ => cfg.user_agent_penalty,
    }
}

/// Behaviour records keyed by normalised address.
#[derive(Clone)]
pub struct BehaviorAnalyzer {
    store: Arc<dyn RecordStore<BehaviorRecord>>,
    config: AnalyzerConfig,
}

impl BehaviorAnalyzer {
    pub fn new(store: Arc<dyn RecordStore<BehaviorRecord>>, config: AnalyzerConfig) -> Self {
        Self { store, config }
    }

    /// Record a request from `address` and return its updated suspicion score.
    pub fn score(&self, address: &str, now: u64, path: &str, user_agent: Option<&str>) -> f64 {
        let mut score = 0.0;
        self.store.upsert(
            address,
            &mut || BehaviorRecord::new(now),
            &mut |record: &mut BehaviorRecord| {
                score = record.observe(now, path, user_agent, &self.config);
            },
        );
        score
    }

    /// Decayed score of `address` at `now`; `0.0` for unknown addresses.
    pub fn current_score(&self, address: &str, now: u64) -> f64 {
        self.store
            .get(address)
            .map_or(0.0, |record| record.decayed_score(now, &self.config))
    }

    pub fn get(&self, address: &str) -> Option<BehaviorRecord> {
        self.store.get(address)
    }

    pub fn forget(&self, address: &str) -> bool {
        self.store.delete(address).is_some()
    }

    /// Drop records not analysed for more than `ttl_ms`.
    pub fn evict_idle(&self, now: u64, ttl_ms: u64) -> usize {
        self.store.sweep(&mut |_: &str, record: &BehaviorRecord| {
            now.saturating_sub(record.last_analysis) <= ttl_ms
        })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Addresses whose decayed score at `now` exceeds `threshold`.
    pub fn count_above(&self, threshold: f64, now: u64) -> usize {
        let mut count = 0;
        self.store.for_each(&mut |_: &str, record: &BehaviorRecord| {
            if record.decayed_score(now, &self.config) > threshold {
                count += 1;
            }
        });
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const T0: u64 = 1_700_000_000_000;
    const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";

    fn analyzer() -> BehaviorAnalyzer {
        BehaviorAnalyzer::new(Arc::new(MemoryStore::new()), AnalyzerConfig::default())
    }

    fn cfg() -> AnalyzerConfig {
        AnalyzerConfig::default()
    }

    /// Delta contributed by the last of `times`, starting from a clean record.
    fn delta_after(times: &[u64], ua: Option<&str>) -> f64 {
        let mut record = BehaviorRecord::new(times[0]);
        let mut before = 0.0;
        let mut after = 0.0;
        for (i, &t) in times.iter().enumerate() {
            if i + 1 == times.len() {
                before = record.decayed_score(t, &cfg());
            }
            after = record.observe(t, "/api/guestbook", ua, &cfg());
        }
        after - before
    }

    #[test]
    fn first_request_with_browser_agent_is_clean() {
        let a = analyzer();
        assert_eq!(a.score("203.0.113.1", T0, "/", Some(BROWSER_UA)), 0.0);
    }

    #[test]
    fn missing_or_short_user_agent_adds_ten() {
        let a = analyzer();
        assert_eq!(a.score("a", T0, "/", None), 10.0);
        let b = analyzer();
        assert_eq!(b.score("b", T0, "/", Some("curl/8")), 10.0);
        let c = analyzer();
        assert_eq!(c.score("c", T0, "/", Some("0123456789")), 0.0);
    }

    #[test]
    fn eleven_requests_burst_harder_than_six() {
        // Irregular spacing so only the burst rule fires.
        let eleven: Vec<u64> = [0, 7, 130, 160, 400, 420, 610, 615, 700, 880, 899]
            .iter()
            .map(|d| T0 + d)
            .collect();
        let six: Vec<u64> = [0, 7, 130, 400, 420, 899].iter().map(|d| T0 + d).collect();

        let eleven_q: VecDeque<u64> = eleven.iter().copied().collect();
        let six_q: VecDeque<u64> = six.iter().copied().collect();
        assert_eq!(burst_delta(&eleven_q, T0 + 899, &cfg()), 30.0);
        assert_eq!(burst_delta(&six_q, T0 + 899, &cfg()), 15.0);
        assert!(delta_after(&eleven, Some(BROWSER_UA)) > delta_after(&six, Some(BROWSER_UA)));
    }

    #[test]
    fn five_requests_in_a_second_is_not_a_burst() {
        let five: VecDeque<u64> = [0, 100, 300, 600, 900].iter().map(|d| T0 + d).collect();
        assert_eq!(burst_delta(&five, T0 + 900, &cfg()), 0.0);
    }

    #[test]
    fn metronomic_requests_are_flagged_as_automated() {
        let ticks: VecDeque<u64> = (0..6).map(|i| T0 + i * 200).collect();
        assert_eq!(regularity_delta(&ticks, &cfg()), 25.0);
    }

    #[test]
    fn regular_but_slow_requests_are_not_flagged() {
        let ticks: VecDeque<u64> = (0..6).map(|i| T0 + i * 600).collect();
        assert_eq!(regularity_delta(&ticks, &cfg()), 0.0);
    }

    #[test]
    fn jittery_requests_are_not_flagged() {
        let ticks: VecDeque<u64> = [0, 40, 300, 320, 480, 700].iter().map(|d| T0 + d).collect();
        assert_eq!(regularity_delta(&ticks, &cfg()), 0.0);
    }

    #[test]
    fn regularity_needs_five_samples() {
        let ticks: VecDeque<u64> = (0..4).map(|i| T0 + i * 100).collect();
        assert_eq!(regularity_delta(&ticks, &cfg()), 0.0);
    }

    #[test]
    fn score_decays_to_exactly_zero_after_five_minutes() {
        let a = analyzer();
        let mut score = 0.0;
        for i in 0..12 {
            score = a.score("bot", T0 + i * 50, "/api/rsvp", None);
        }
        assert!(score > 50.0, "score was {score}");
        let last = T0 + 11 * 50;
        assert!(a.current_score("bot", last + 150_000) > 0.0);
        assert_eq!(a.current_score("bot", last + 300_000), 0.0);
        assert_eq!(a.current_score("bot", last + 3_600_000), 0.0);
    }

    #[test]
    fn decay_is_linear() {
        let mut record = BehaviorRecord::new(T0);
        record.suspicion_score = 80.0;
        assert_eq!(record.decayed_score(T0 + 75_000, &cfg()), 60.0);
        assert_eq!(record.decayed_score(T0 + 150_000, &cfg()), 40.0);
    }

    #[test]
    fn history_is_capped() {
        let mut record = BehaviorRecord::new(T0);
        for i in 0..150 {
            record.observe(T0 + i * 10_000, "/a", Some(BROWSER_UA), &cfg());
        }
        assert_eq!(record.timestamps.len(), 100);
        assert_eq!(record.timestamps.front().copied(), Some(T0 + 50 * 10_000));
        assert_eq!(record.paths.get("/a"), Some(&150));
    }

    #[test]
    fn records_are_shared_across_paths_and_remember_agent() {
        let a = analyzer();
        a.score("a", T0, "/api/rsvp", Some(BROWSER_UA));
        a.score("a", T0 + 5_000, "/api/guestbook", Some(BROWSER_UA));
        let record = a.get("a").unwrap();
        assert_eq!(record.paths.len(), 2);
        assert_eq!(record.user_agent.as_deref(), Some(BROWSER_UA));
        assert_eq!(record.last_analysis, T0 + 5_000);
    }

    #[test]
    fn evict_idle_and_high_suspicion_counts() {
        let a = analyzer();
        for i in 0..12 {
            a.score("bot", T0 + i * 50, "/", None);
        }
        a.score("human", T0 - 31 * 60_000, "/", Some(BROWSER_UA));
        assert_eq!(a.count_above(50.0, T0 + 600), 1);
        assert_eq!(a.evict_idle(T0 + 600, 30 * 60_000), 1);
        assert!(a.get("human").is_none());
        assert!(a.forget("bot"));
        assert!(a.is_empty());
    }
}
