//! Axum-based HTTP gateway server.
//!
//! [`GatewayServer`] wires the category router, the admission gate, the
//! filter pipeline and the upstream backend into a running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Liveness check, never gated. |
//! | `GET`    | `/admin/admission/stats` | Tracked-state counters (gated, `admin`, operator key). |
//! | `DELETE` | `/admin/admission/records/{address}` | Forget an address (gated, `admin`, operator key). |
//!
//! The admin endpoints require one of the configured `admin_keys` as
//! `Authorization: Bearer <key>` or `X-Api-Key: <key>`; without keys they
//! answer 403.
//! | `ANY`    | everything else | Gated by route category, then forwarded upstream. |

use crate::backend::UpstreamBackend;
use crate::error::{GatewayError, GatewayResult};
use crate::filter::{AdmissionFilter, FilterPipeline, LoggingFilter, OperatorKeyFilter};
use crate::gate::{AdmissionGate, AdmissionStats, ClearedRecords};
use crate::identity::IdentityResolver;
use crate::reaper::Reaper;
use crate::router::PatternRouter;
use crate::settings::GatewaySettings;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tollgate_kernel::admission::{
    CategoryRouter, DEFAULT_CATEGORY, FilterAction, GatewayContext, GatewayFilter, GatewayRequest,
    GatewayResponse, HttpMethod, Rejection, RouteConfig,
};
use tollgate_kernel::{Clock, SystemClock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Id of the built-in route that classifies the admin API.
pub const ADMIN_ROUTE_ID: &str = "tollgate-admin";

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    gate: Arc<AdmissionGate>,
    router: Arc<PatternRouter>,
    pipeline: Arc<FilterPipeline>,
    upstream: Option<Arc<UpstreamBackend>>,
}

/// A built application: the axum router plus the gate it drives.
pub struct GatewayApp {
    pub router: Router,
    pub gate: Arc<AdmissionGate>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// High-level gateway server.
pub struct GatewayServer {
    settings: GatewaySettings,
}

impl GatewayServer {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Build the axum [`Router`] with time read from `clock`.
    ///
    /// Validates the settings, registers the category routes (plus the
    /// built-in admin route) and constructs the filter pipeline. Call
    /// [`start()`](Self::start) to bind and serve.
    pub fn build_app(&self, clock: Arc<dyn Clock>) -> GatewayResult<GatewayApp> {
        self.settings.validate()?;

        let mut config = self.settings.admission_config();
        // Registered first so no user route of equal priority can shadow it.
        config.routes.insert(
            0,
            RouteConfig::new(ADMIN_ROUTE_ID, "/admin/admission/{*rest}", "admin")
                .with_priority(i32::MAX),
        );

        let router = PatternRouter::from_routes(config.routes.clone())?;
        let gate = Arc::new(AdmissionGate::new(
            config,
            IdentityResolver::new(self.settings.trust_forwarded_for),
            Arc::clone(&clock),
        )?);

        let operator_auth = OperatorKeyFilter::new(self.settings.admin_keys.clone(), [ADMIN_ROUTE_ID]);
        if !operator_auth.is_enabled() {
            warn!("no admin_keys configured, admin API is disabled");
        }
        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(LoggingFilter::new(clock)),
            Arc::new(AdmissionFilter::new(Arc::clone(&gate))),
            Arc::new(operator_auth),
        ];

        let upstream = match &self.settings.upstream_url {
            Some(url) => Some(Arc::new(UpstreamBackend::new(
                url,
                Duration::from_millis(self.settings.upstream_timeout_ms),
            )?)),
            None => None,
        };

        let state = AppState {
            gate: Arc::clone(&gate),
            router: Arc::new(router),
            pipeline: Arc::new(FilterPipeline::new(filters)),
            upstream,
        };

        let gated = Router::new()
            .route("/admin/admission/stats", get(stats_handler))
            .route("/admin/admission/records/{address}", delete(clear_handler))
            .fallback(proxy_handler)
            .layer(middleware::from_fn_with_state(
                state.clone(),
                admission_middleware,
            ))
            .with_state(state);

        let router = Router::new()
            .route("/health", get(health_handler))
            .merge(gated)
            .layer(TraceLayer::new_for_http());

        Ok(GatewayApp { router, gate })
    }

    /// Bind to `{bind_addr}:{port}` and serve until Ctrl-C.
    pub async fn start(self) -> GatewayResult<()> {
        let app = self.build_app(Arc::new(SystemClock))?;
        let reaper = Reaper::spawn(&app.gate);

        let addr = self.settings.socket_addr();
        info!(
            addr = %addr,
            upstream = ?self.settings.upstream_url,
            routes = self.settings.routes.len(),
            "Tollgate admission gateway starting"
        );
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let served = axum::serve(
            listener,
            app.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        reaper.shutdown().await;
        info!("Tollgate admission gateway stopped");
        served.map_err(GatewayError::from)
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// Admission middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Runs every gated request through the filter pipeline.
async fn admission_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(method) = HttpMethod::from_str_ci(req.method().as_str()) else {
        return GatewayError::MethodNotAllowed(req.method().to_string()).into_response();
    };
    let path = req.uri().path().to_string();

    let mut gw_req = GatewayRequest::new(Uuid::new_v4().to_string(), &path, method);
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            gw_req = gw_req.with_header(name.as_str(), v);
        }
    }
    if let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        gw_req = gw_req.with_remote_addr(peer.ip().to_string());
    }

    let matched = state
        .router
        .resolve(&path, &gw_req.method)
        .map(|route| (route.category.clone(), route.id.clone()));
    let mut ctx = match matched {
        Some((category, route_id)) => GatewayContext::new(gw_req, category).with_route_id(route_id),
        None => GatewayContext::new(gw_req, DEFAULT_CATEGORY),
    };

    match state.pipeline.run_request(&mut ctx).await {
        Ok(FilterAction::Reject(rejection)) => {
            let mut gw_resp = GatewayResponse::new(rejection.status);
            run_response(&state, &ctx, &mut gw_resp).await;
            return rejection_response(rejection, gw_resp.headers);
        }
        Ok(_) => {}
        Err(err) => {
            warn!(
                request_id = %ctx.request.id,
                error = %err,
                "request filter pipeline error, admitting request"
            );
        }
    }

    let mut response = next.run(req).await;
    let mut gw_resp = GatewayResponse::new(response.status().as_u16());
    run_response(&state, &ctx, &mut gw_resp).await;
    append_headers(response.headers_mut(), gw_resp.headers);
    response
}

async fn run_response(state: &AppState, ctx: &GatewayContext, resp: &mut GatewayResponse) {
    if let Err(err) = state.pipeline.run_response(ctx, resp).await {
        warn!(
            request_id = %ctx.request.id,
            error = %err,
            "response filter pipeline error (response still returned)"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health` — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "tollgate" }))
}

/// `GET /admin/admission/stats`
async fn stats_handler(State(state): State<AppState>) -> Json<AdmissionStats> {
    Json(state.gate.stats())
}

/// `DELETE /admin/admission/records/{address}`
async fn clear_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Json<ClearedRecords> {
    Json(state.gate.clear_record(&address))
}

/// Everything else: forward to the upstream service.
async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<Response> {
    let Some(upstream) = &state.upstream else {
        return Err(GatewayError::RouteNotFound(uri.path().to_string()));
    };
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());
    upstream.forward(method, path_and_query, &headers, body).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn rejection_response(rejection: Rejection, extra: HashMap<String, String>) -> Response {
    let status = StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
    let mut response = (status, Json(rejection.body)).into_response();
    append_headers(response.headers_mut(), rejection.headers);
    append_headers(response.headers_mut(), extra);
    response
}

fn append_headers(target: &mut HeaderMap, headers: impl IntoIterator<Item = (String, String)>) {
    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                target.insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_headers_are_dropped() {
        let mut map = HeaderMap::new();
        append_headers(
            &mut map,
            [
                ("x-ratelimit-limit".to_string(), "5".to_string()),
                ("bad header".to_string(), "x".to_string()),
            ],
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map["x-ratelimit-limit"], "5");
    }

    #[test]
    fn rejection_maps_to_429_with_headers() {
        let rejection = Rejection::new(429, json!({ "message": "slow down" }))
            .with_header("retry-after", "3");
        let resp = rejection_response(rejection, HashMap::new());
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()["retry-after"], "3");
    }

    #[test]
    fn duplicate_admin_route_id_is_rejected() {
        let settings = GatewaySettings {
            routes: vec![RouteConfig::new(ADMIN_ROUTE_ID, "/x", "read")],
            ..GatewaySettings::default()
        };
        let result = GatewayServer::new(settings).build_app(Arc::new(SystemClock));
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }
}
