//! Filter module.

mod admission;
mod auth;
mod logger;

pub use admission::{
    AdmissionFilter, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER,
};
pub use auth::OperatorKeyFilter;
pub use logger::LoggingFilter;

use std::sync::Arc;
use tollgate_kernel::admission::{
    AdmissionError, FilterAction, GatewayContext, GatewayFilter, GatewayResponse,
};

/// Ordered list of boxed filters executed as a pipeline.
///
/// Filters are sorted by [`FilterOrder`](tollgate_kernel::admission::FilterOrder)
/// in ascending order (lowest value runs first on the request path).
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
}

impl FilterPipeline {
    /// Build a pipeline from a list of filters, sorted by their declared order.
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// Names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run all filters' `on_request` hooks in ascending order.
    ///
    /// Short-circuits on the first `Reject`.
    pub async fn run_request(
        &self,
        ctx: &mut GatewayContext,
    ) -> Result<FilterAction, AdmissionError> {
        for filter in &self.filters {
            match filter.on_request(ctx).await? {
                FilterAction::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(FilterAction::Continue)
    }

    /// Run all filters' `on_response` hooks in descending order.
    pub async fn run_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), AdmissionError> {
        for filter in self.filters.iter().rev() {
            filter.on_response(ctx, resp).await?;
        }
        Ok(())
    }
}
