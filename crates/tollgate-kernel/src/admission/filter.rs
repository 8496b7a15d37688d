//! Gateway filter trait and filter-chain types.
//!
//! A filter chain is an ordered list of [`GatewayFilter`] instances applied
//! to every request and response.  Filters are sorted by their declared
//! [`FilterOrder`] and executed in ascending order on the request path
//! (lowest value first) and descending order on the response path.
//!
//! ```text
//! Request  ──► PreAdmission ──► Admission ──► Auth
//!                  (wrapped handler runs here)
//! Response ◄── Auth ◄── Admission ◄── PreAdmission
//! ```

use super::error::AdmissionError;
use super::types::{GatewayContext, GatewayResponse};
use async_trait::async_trait;

// ─────────────────────────────────────────────────────────────────────────────
// Filter ordering
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric ordering slot for a filter in the chain.
///
/// The well-known slots below act as guidelines; any `u32` value is accepted
/// so implementors can slot in custom filters between the standard phases.
/// Filters with equal order values are executed in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterOrder(pub u32);

impl FilterOrder {
    /// Executes before admission (access logging, request ID injection).
    /// Its response hook runs last and sees the final status.
    pub const PRE_ADMISSION: FilterOrder = FilterOrder(0);
    /// Quota and suspicion checks.
    pub const ADMISSION: FilterOrder = FilterOrder(200);
    /// Credential checks, behind the quota of the request's category.
    pub const AUTH: FilterOrder = FilterOrder(300);
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter action
// ─────────────────────────────────────────────────────────────────────────────

/// A synthetic response produced by a filter that short-circuits the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// HTTP status code.
    pub status: u16,
    /// Extra response headers (lowercase names).
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: serde_json::Value,
}

impl Rejection {
    /// Rejection with a status and JSON body and no extra headers.
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// Builder helper: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into().to_lowercase(), value.into()));
        self
    }
}

/// Instruction returned by [`GatewayFilter::on_request`] controlling what
/// the gateway does with the request after the filter runs.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FilterAction {
    /// Pass the request to the next filter or the wrapped handler.
    Continue,
    /// Short-circuit the chain and answer with the given rejection.
    Reject(Rejection),
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayFilter trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for a single filter in the admission pipeline.
///
/// Implementations must be `Send + Sync` so they can be shared across Tokio
/// tasks without additional synchronization by the caller.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    /// Stable, human-readable identifier for this filter (used in logs).
    fn name(&self) -> &str;

    /// Position in the filter chain.  Lower values execute first on the
    /// request path.
    fn order(&self) -> FilterOrder;

    /// Called with the inbound request *before* the wrapped handler runs.
    ///
    /// Implementations may suspend (an artificial delay) and may write
    /// attributes into `ctx` for the response path.
    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, AdmissionError>;

    /// Called with the handler's response *before* it is returned to the caller.
    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), AdmissionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_orders_sort_admission_before_auth() {
        let mut orders = vec![
            FilterOrder::AUTH,
            FilterOrder::ADMISSION,
            FilterOrder::PRE_ADMISSION,
        ];
        orders.sort();
        assert_eq!(
            orders,
            vec![
                FilterOrder::PRE_ADMISSION,
                FilterOrder::ADMISSION,
                FilterOrder::AUTH
            ]
        );
    }

    struct RequireUserAgent;

    #[async_trait]
    impl GatewayFilter for RequireUserAgent {
        fn name(&self) -> &str {
            "require-user-agent"
        }

        fn order(&self) -> FilterOrder {
            FilterOrder::PRE_ADMISSION
        }

        async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, AdmissionError> {
            if ctx.request.header("user-agent").is_some() {
                return Ok(FilterAction::Continue);
            }
            Ok(FilterAction::Reject(Rejection::new(400, json!({ "message": "user-agent required" }))))
        }

        async fn on_response(
            &self,
            _ctx: &GatewayContext,
            resp: &mut GatewayResponse,
        ) -> Result<(), AdmissionError> {
            resp.headers.insert("x-checked".to_string(), "1".to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn custom_filters_can_reject_and_annotate() {
        use crate::admission::types::{GatewayRequest, HttpMethod};

        let filter = RequireUserAgent;
        let mut bare = GatewayContext::new(GatewayRequest::new("r1", "/", HttpMethod::Get), "read");
        let action = filter.on_request(&mut bare).await.unwrap();
        assert!(matches!(action, FilterAction::Reject(ref r) if r.status == 400));

        let req = GatewayRequest::new("r2", "/", HttpMethod::Get).with_header("User-Agent", "Mozilla/5.0");
        let mut ctx = GatewayContext::new(req, "read");
        assert_eq!(filter.on_request(&mut ctx).await.unwrap(), FilterAction::Continue);

        let mut resp = GatewayResponse::new(200);
        filter.on_response(&ctx, &mut resp).await.unwrap();
        assert_eq!(resp.headers.get("x-checked").map(String::as_str), Some("1"));
    }

    #[test]
    fn rejection_header_names_are_lowercased() {
        let r = Rejection::new(429, json!({ "message": "slow down" })).with_header("Retry-After", "3");
        assert_eq!(r.headers, vec![("retry-after".to_string(), "3".to_string())]);
    }
}
