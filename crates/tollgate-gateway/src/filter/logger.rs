//! Structured access-log filter.
//!
//! Emits `tracing` events on both the request and response path, recording
//! request id, method, path, category, status, suspicion and latency. Runs
//! ahead of admission, so rejected requests are logged on the way in too.

use super::admission::ATTR_SUSPICION;
use super::auth::ATTR_OPERATOR;
use async_trait::async_trait;
use std::sync::Arc;
use tollgate_kernel::Clock;
use tollgate_kernel::admission::{
    AdmissionError, FilterAction, FilterOrder, GatewayContext, GatewayFilter, GatewayResponse,
};
use tracing::{error, info, warn};

const ATTR_START_MS: &str = "log.request_start_ms";

/// Logging filter — records inbound requests and outbound responses.
pub struct LoggingFilter {
    clock: Arc<dyn Clock>,
}

impl LoggingFilter {
    /// Latency is measured on `clock`, the same clock the gate reads.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl GatewayFilter for LoggingFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::PRE_ADMISSION
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, AdmissionError> {
        info!(
            request_id = %ctx.request.id,
            method     = ctx.request.method.as_str(),
            path       = %ctx.request.path,
            category   = %ctx.category,
            "→ inbound request"
        );
        ctx.set_attr(ATTR_START_MS, &self.clock.now_millis());
        Ok(FilterAction::Continue)
    }

    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), AdmissionError> {
        let elapsed = ctx
            .get_attr::<u64>(ATTR_START_MS)
            .map_or(0, |start| self.clock.now_millis().saturating_sub(start));
        let suspicion: f64 = ctx.get_attr(ATTR_SUSPICION).unwrap_or(0.0);

        if resp.status >= 500 {
            error!(
                request_id = %ctx.request.id,
                path       = %ctx.request.path,
                status     = resp.status,
                latency_ms = elapsed,
                "← upstream error response"
            );
        } else if matches!(resp.status, 401 | 403 | 429) {
            warn!(
                request_id = %ctx.request.id,
                path       = %ctx.request.path,
                category   = %ctx.category,
                status     = resp.status,
                suspicion,
                "← rejected"
            );
        } else {
            info!(
                request_id = %ctx.request.id,
                path       = %ctx.request.path,
                status     = resp.status,
                operator   = ctx.get_attr::<bool>(ATTR_OPERATOR).unwrap_or(false),
                suspicion,
                latency_ms = elapsed,
                "← outbound response"
            );
        }

        resp.latency_ms = elapsed;
        Ok(())
    }
}
