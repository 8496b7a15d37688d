//! Transparent HTTP forwarding to the protected service.
//!
//! [`UpstreamBackend`] relays method, path, query, headers and body of an
//! admitted request to `{base_url}{path_and_query}` and relays the upstream
//! response back verbatim, minus hop-by-hop headers.

use crate::error::{GatewayError, GatewayResult};
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::Response;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Forwards admitted requests to one upstream base URL.
pub struct UpstreamBackend {
    base_url: String,
    client: Client,
}

impl UpstreamBackend {
    /// Create a backend for `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward one request and return the upstream response.
    #[instrument(skip(self, headers, body), fields(upstream = %self.base_url))]
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> GatewayResult<Response> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(url = %url, "forwarding to upstream");

        let mut builder = self.client.request(method, &url);
        for (name, value) in headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name, value);
            }
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let upstream = builder.send().await.map_err(|source| GatewayError::Upstream {
            url: url.clone(),
            source,
        })?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let upstream_headers = upstream.headers().clone();
        let bytes = upstream
            .bytes()
            .await
            .map_err(|source| GatewayError::Upstream { url, source })?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        for (name, value) in &upstream_headers {
            if !is_hop_by_hop(name) {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }
        Ok(response)
    }
}
