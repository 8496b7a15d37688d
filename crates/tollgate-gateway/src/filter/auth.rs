//! Operator-key authentication for protected routes.
//!
//! Requests matched to one of the protected route ids must carry a valid
//! operator key in either:
//! - `Authorization: Bearer <key>` header
//! - `X-Api-Key: <key>` header
//!
//! Missing or invalid keys receive `401 Unauthorized`. With no keys
//! configured the protected routes answer `403 Forbidden`. Other routes pass
//! through untouched.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use tollgate_kernel::admission::{
    AdmissionError, FilterAction, FilterOrder, GatewayContext, GatewayFilter, GatewayResponse,
    Rejection,
};
use tracing::warn;

/// Context attribute set once a request has been authenticated.
pub(crate) const ATTR_OPERATOR: &str = "auth.operator";

/// Authentication filter guarding a fixed set of routes.
pub struct OperatorKeyFilter {
    valid_keys: HashSet<String>,
    protected_routes: HashSet<String>,
}

impl OperatorKeyFilter {
    /// Guard `protected_routes` with `valid_keys`. Blank keys are ignored.
    pub fn new(
        valid_keys: impl IntoIterator<Item = impl Into<String>>,
        protected_routes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            valid_keys: valid_keys
                .into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.trim().is_empty())
                .collect(),
            protected_routes: protected_routes.into_iter().map(Into::into).collect(),
        }
    }

    /// `false` when no key is configured and protected routes are closed.
    pub fn is_enabled(&self) -> bool {
        !self.valid_keys.is_empty()
    }

    fn extract_key(ctx: &GatewayContext) -> Option<&str> {
        if let Some(key) = ctx.request.header("x-api-key") {
            return Some(key);
        }
        ctx.request
            .header("authorization")
            .and_then(|auth| auth.strip_prefix("Bearer "))
    }

    fn protects(&self, ctx: &GatewayContext) -> bool {
        ctx.route_id
            .as_deref()
            .is_some_and(|id| self.protected_routes.contains(id))
    }

    fn reject(status: u16, code: &str, message: &str) -> FilterAction {
        let body = json!({ "error": { "code": code, "message": message } });
        let rejection = Rejection::new(status, body);
        let rejection = if status == 401 {
            rejection.with_header("www-authenticate", "Bearer")
        } else {
            rejection
        };
        FilterAction::Reject(rejection)
    }
}

#[async_trait]
impl GatewayFilter for OperatorKeyFilter {
    fn name(&self) -> &str {
        "operator-key-auth"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, AdmissionError> {
        if !self.protects(ctx) {
            return Ok(FilterAction::Continue);
        }
        if !self.is_enabled() {
            warn!(request_id = %ctx.request.id, path = %ctx.request.path, "rejected request: admin API disabled");
            return Ok(Self::reject(
                403,
                "FORBIDDEN",
                "Admin API is disabled: no operator keys are configured",
            ));
        }
        let accepted = Self::extract_key(ctx).map(|key| self.valid_keys.contains(key));
        match accepted {
            Some(true) => {
                ctx.set_attr(ATTR_OPERATOR, &true);
                Ok(FilterAction::Continue)
            }
            Some(false) => {
                warn!(request_id = %ctx.request.id, "rejected request: invalid operator key");
                Ok(Self::reject(401, "UNAUTHORIZED", "Invalid operator key"))
            }
            None => {
                warn!(request_id = %ctx.request.id, "rejected request: missing operator key");
                Ok(Self::reject(
                    401,
                    "UNAUTHORIZED",
                    "Missing authentication credentials",
                ))
            }
        }
    }

    async fn on_response(
        &self,
        _ctx: &GatewayContext,
        _resp: &mut GatewayResponse,
    ) -> Result<(), AdmissionError> {
        Ok(())
    }
}
