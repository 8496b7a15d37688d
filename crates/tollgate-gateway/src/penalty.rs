//! Block-duration calculation.
//!
//! `duration = 1000 ms * multiplier^violations + suspicion / 100 * 5000 ms`,
//! clamped to `[0, policy.max_delay_ms]`. The clamp is unconditional: a
//! misconfigured multiplier or a runaway score can never produce a block
//! longer than the policy allows.

use tollgate_kernel::admission::Policy;

/// Duration of the first step of the exponential curve.
pub const BASE_DELAY_MS: f64 = 1_000.0;

/// Extra block time contributed by a suspicion score of 100.
pub const SUSPICION_WEIGHT_MS: f64 = 5_000.0;

/// Block duration in milliseconds for the `violations`-th violation of an
/// address whose current suspicion score is `suspicion`.
pub fn block_duration(violations: u32, suspicion: f64, policy: &Policy) -> u64 {
    let exponent = i32::try_from(violations).unwrap_or(i32::MAX);
    let escalation = BASE_DELAY_MS * policy.delay_multiplier.powi(exponent);
    let surcharge = suspicion.max(0.0) / 100.0 * SUSPICION_WEIGHT_MS;
    let raw = escalation + surcharge;

    let cap = policy.max_delay_ms as f64;
    if raw.is_nan() {
        return policy.max_delay_ms;
    }
    // `as` saturates, and the clamp keeps us inside [0, max_delay_ms].
    raw.clamp(0.0, cap) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_kernel::admission::PolicyTable;

    fn policy(category: &str) -> Policy {
        PolicyTable::defaults().resolve(category).clone()
    }

    #[test]
    fn escalates_exponentially_with_violations() {
        let p = policy("rsvp"); // multiplier 2
        assert_eq!(block_duration(0, 0.0, &p), 1_000);
        assert_eq!(block_duration(1, 0.0, &p), 2_000);
        assert_eq!(block_duration(3, 0.0, &p), 8_000);
    }

    #[test]
    fn suspicion_adds_a_linear_surcharge() {
        let p = policy("rsvp");
        assert_eq!(block_duration(1, 50.0, &p), 2_000 + 2_500);
        assert_eq!(block_duration(1, 100.0, &p), 2_000 + 5_000);
    }

    #[test]
    fn never_exceeds_the_policy_ceiling() {
        let p = policy("read"); // cap 10s
        assert_eq!(block_duration(40, 0.0, &p), 10_000);
        assert_eq!(block_duration(u32::MAX, 1e12, &p), 10_000);
        assert_eq!(block_duration(1, f64::INFINITY, &p), 10_000);
    }

    #[test]
    fn nan_suspicion_is_treated_as_zero() {
        let p = policy("rsvp");
        assert_eq!(block_duration(1, f64::NAN, &p), 2_000);
    }

    #[test]
    fn negative_suspicion_never_shortens_the_block() {
        let p = policy("rsvp");
        assert_eq!(block_duration(1, -500.0, &p), 2_000);
    }

    #[test]
    fn monotonic_in_both_inputs() {
        for category in ["default", "rsvp", "guestbook", "auth", "admin", "read", "guestCodes"] {
            let p = policy(category);
            for suspicion in [0.0, 12.5, 50.0, 99.0, 250.0] {
                let mut prev = 0;
                for v in 0..30 {
                    let d = block_duration(v, suspicion, &p);
                    assert!(d >= prev, "{category}: v={v} s={suspicion}");
                    assert!(d <= p.max_delay_ms);
                    prev = d;
                }
            }
            for v in [0, 1, 4, 9] {
                let mut prev = 0;
                for s in 0..200 {
                    let d = block_duration(v, f64::from(s), &p);
                    assert!(d >= prev, "{category}: v={v} s={s}");
                    prev = d;
                }
            }
        }
    }

    #[test]
    fn misconfigured_ceiling_still_clamps() {
        let p = Policy::new(1, 1_000, 10.0, 0, "no");
        assert_eq!(block_duration(5, 100.0, &p), 0);
    }
}
