//! Admission filter: turns [`AdmissionGate`] decisions into chain actions.
//!
//! Open requests continue immediately, throttled ones continue after an
//! async sleep that suspends only the current request, and blocked ones are
//! rejected with `429`, a `Retry-After` header and a JSON body. Quota
//! figures for admitted requests are stashed in the context and emitted as
//! `X-RateLimit-*` headers on the response path.

use crate::gate::{AdmissionDecision, AdmissionGate, Allowance, BlockNotice};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tollgate_kernel::admission::{
    AdmissionError, FilterAction, FilterOrder, GatewayContext, GatewayFilter, GatewayResponse,
    Rejection,
};
use tracing::{debug, info};

const ATTR_ALLOWANCE: &str = "admission.allowance";
pub(crate) const ATTR_SUSPICION: &str = "admission.suspicion";
const ATTR_THROTTLED_MS: &str = "admission.throttled_ms";

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Quota and suspicion gate as a pipeline filter.
pub struct AdmissionFilter {
    gate: Arc<AdmissionGate>,
}

impl AdmissionFilter {
    pub fn new(gate: Arc<AdmissionGate>) -> Self {
        Self { gate }
    }

    fn rejection(notice: &BlockNotice) -> Rejection {
        Rejection::new(
            429,
            json!({
                "message": notice.message,
                "retryAfter": notice.retry_after_secs,
                "violations": notice.violations,
            }),
        )
        .with_header(HEADER_RETRY_AFTER, notice.retry_after_secs.to_string())
    }
}

#[async_trait]
impl GatewayFilter for AdmissionFilter {
    fn name(&self) -> &str {
        "admission"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::ADMISSION
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, AdmissionError> {
        let decision = self.gate.admit(&ctx.request, &ctx.category);
        ctx.set_attr(ATTR_SUSPICION, &decision.suspicion());

        match decision {
            AdmissionDecision::Open { allowance, .. } => {
                ctx.set_attr(ATTR_ALLOWANCE, &allowance);
                Ok(FilterAction::Continue)
            }
            AdmissionDecision::Throttled {
                allowance,
                delay,
                suspicion,
            } => {
                debug!(
                    request_id = %ctx.request.id,
                    suspicion,
                    delay_ms = delay.as_millis() as u64,
                    "delaying request"
                );
                tokio::time::sleep(delay).await;
                ctx.set_attr(ATTR_ALLOWANCE, &allowance);
                ctx.set_attr(ATTR_THROTTLED_MS, &(delay.as_millis() as u64));
                Ok(FilterAction::Continue)
            }
            AdmissionDecision::Blocked(notice) => {
                info!(
                    request_id = %ctx.request.id,
                    category = %notice.category,
                    retry_after = notice.retry_after_secs,
                    violations = notice.violations,
                    "request rejected"
                );
                Ok(FilterAction::Reject(Self::rejection(&notice)))
            }
        }
    }

    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), AdmissionError> {
        if let Some(allowance) = ctx.get_attr::<Allowance>(ATTR_ALLOWANCE) {
            resp.headers
                .insert(HEADER_LIMIT.to_string(), allowance.limit.to_string());
            resp.headers
                .insert(HEADER_REMAINING.to_string(), allowance.remaining.to_string());
            resp.headers
                .insert(HEADER_RESET.to_string(), allowance.reset_at.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityResolver;
    use std::time::Duration;
    use tollgate_kernel::admission::{AdmissionConfig, GatewayRequest, HttpMethod};
    use tollgate_kernel::ManualClock;

    const T0: u64 = 1_700_000_000_000;

    fn filter() -> (AdmissionFilter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let gate = AdmissionGate::new(
            AdmissionConfig::default(),
            IdentityResolver::default(),
            clock.clone(),
        )
        .unwrap();
        (AdmissionFilter::new(Arc::new(gate)), clock)
    }

    fn ctx(category: &str, ua: Option<&str>) -> GatewayContext {
        let mut req = GatewayRequest::new("r-1", "/api/guestbook", HttpMethod::Post)
            .with_remote_addr("203.0.113.20");
        if let Some(ua) = ua {
            req = req.with_header("user-agent", ua);
        }
        GatewayContext::new(req, category)
    }

    #[tokio::test]
    async fn admitted_responses_carry_quota_headers() {
        let (filter, _clock) = filter();
        let mut ctx = ctx("guestbook", Some("Mozilla/5.0 (Windows NT 10.0)"));
        assert_eq!(filter.on_request(&mut ctx).await.unwrap(), FilterAction::Continue);

        let mut resp = GatewayResponse::new(200);
        filter.on_response(&ctx, &mut resp).await.unwrap();
        assert_eq!(resp.headers.get(HEADER_LIMIT).map(String::as_str), Some("5"));
        assert_eq!(resp.headers.get(HEADER_REMAINING).map(String::as_str), Some("4"));
        assert_eq!(
            resp.headers.get(HEADER_RESET).map(String::as_str),
            Some((T0 + 60_000).to_string().as_str())
        );
    }

    #[tokio::test]
    async fn sixth_guestbook_post_is_rejected_with_retry_after() {
        let (filter, clock) = filter();
        for _ in 0..5 {
            let mut ctx = ctx("guestbook", Some("Mozilla/5.0 (Windows NT 10.0)"));
            filter.on_request(&mut ctx).await.unwrap();
            clock.advance(2_000);
        }
        let mut ctx = ctx("guestbook", Some("Mozilla/5.0 (Windows NT 10.0)"));
        let FilterAction::Reject(rejection) = filter.on_request(&mut ctx).await.unwrap() else {
            panic!("sixth request should be rejected");
        };
        assert_eq!(rejection.status, 429);
        assert_eq!(
            rejection.headers,
            vec![(HEADER_RETRY_AFTER.to_string(), "2".to_string())]
        );
        assert_eq!(rejection.body["retryAfter"], 2);
        assert_eq!(rejection.body["violations"], 1);
        assert!(rejection.body["message"].as_str().is_some_and(|m| !m.is_empty()));

        let mut resp = GatewayResponse::new(429);
        filter.on_response(&ctx, &mut resp).await.unwrap();
        assert!(resp.headers.get(HEADER_LIMIT).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_requests_are_delayed_not_rejected() {
        let (filter, clock) = filter();
        let mut last = None;
        for _ in 0..8 {
            let mut ctx = ctx("read", None);
            let started = tokio::time::Instant::now();
            let action = filter.on_request(&mut ctx).await.unwrap();
            assert_eq!(action, FilterAction::Continue);
            last = Some((ctx, started.elapsed()));
            clock.advance(50);
        }
        let (ctx, waited) = last.unwrap();
        let throttled_ms: u64 = ctx.get_attr(ATTR_THROTTLED_MS).unwrap();
        assert!(throttled_ms > 0 && throttled_ms <= 2_000);
        assert!(waited >= Duration::from_millis(throttled_ms));
        assert!(waited < Duration::from_millis(throttled_ms + 5));
    }
}
