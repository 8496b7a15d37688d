//! Background eviction of idle admission records.
//!
//! The reaper wakes every `reap_interval_ms` and asks the gate to drop quota
//! and behaviour records idle for longer than `idle_ttl_ms`. It holds only a
//! weak reference to the gate and stops on cancellation, on drop, or once
//! the gate itself is gone.

use crate::gate::AdmissionGate;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to the running eviction task.
pub struct Reaper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn a reaper for `gate` using its configured interval.
    pub fn spawn(gate: &Arc<AdmissionGate>) -> Self {
        let period = Duration::from_millis(gate.tuning().reap_interval_ms.max(1));
        Self::spawn_with_period(gate, period)
    }

    /// Spawn a reaper for `gate` sweeping every `period`.
    pub fn spawn_with_period(gate: &Arc<AdmissionGate>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(Arc::downgrade(gate), period, cancel.clone()));
        info!(period_ms = period.as_millis() as u64, "admission reaper started");
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Token that stops the task when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("admission reaper stopped");
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(gate: Weak<AdmissionGate>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(gate) = gate.upgrade() else {
            debug!("admission gate dropped, reaper exiting");
            break;
        };
        let report = gate.sweep_idle();
        if report.total() > 0 {
            debug!(
                quota_records = report.quota_records,
                behavior_records = report.behavior_records,
                "evicted idle admission records"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityResolver;
    use tollgate_kernel::admission::{AdmissionConfig, GatewayRequest, HttpMethod};
    use tollgate_kernel::ManualClock;

    const T0: u64 = 1_700_000_000_000;
    const MINUTE: u64 = 60_000;

    fn visit(gate: &AdmissionGate, addr: &str) {
        let req = GatewayRequest::new("r", "/", HttpMethod::Get)
            .with_remote_addr(addr)
            .with_header("user-agent", "Mozilla/5.0 (X11; Linux x86_64)");
        gate.admit(&req, "read");
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_stale_records_and_keeps_recent_ones() {
        let clock = Arc::new(ManualClock::new(T0));
        let gate = Arc::new(
            AdmissionGate::new(
                AdmissionConfig::default(),
                IdentityResolver::default(),
                clock.clone(),
            )
            .unwrap(),
        );
        visit(&gate, "10.0.0.1");
        clock.set(T0 + 2 * MINUTE);
        visit(&gate, "10.0.0.2");
        // 31 minutes after the first visit, 29 after the second.
        clock.set(T0 + 31 * MINUTE);

        let reaper = Reaper::spawn(&gate);
        assert_eq!(gate.stats().active_records, 2);

        tokio::time::sleep(Duration::from_millis(5 * MINUTE + 10)).await;

        let stats = gate.stats();
        assert_eq!(stats.active_records, 1);
        assert_eq!(stats.behavior_records, 1);
        assert_eq!(gate.suspicion_of("10.0.0.2"), 0.0);
        reaper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_sweep_before_the_first_interval() {
        let clock = Arc::new(ManualClock::new(T0));
        let gate = Arc::new(
            AdmissionGate::new(
                AdmissionConfig::default(),
                IdentityResolver::default(),
                clock.clone(),
            )
            .unwrap(),
        );
        visit(&gate, "10.0.0.1");
        clock.set(T0 + 60 * MINUTE);

        let reaper = Reaper::spawn(&gate);
        tokio::time::sleep(Duration::from_millis(4 * MINUTE)).await;
        assert_eq!(gate.stats().active_records, 1);
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_the_task() {
        let gate = Arc::new(
            AdmissionGate::new(
                AdmissionConfig::default(),
                IdentityResolver::default(),
                Arc::new(ManualClock::new(T0)),
            )
            .unwrap(),
        );
        let reaper = Reaper::spawn(&gate);
        let token = reaper.cancel_token();
        assert!(!token.is_cancelled());
        drop(reaper);
        assert!(token.is_cancelled());
    }
}
