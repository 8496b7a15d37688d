//! Core data types for the admission kernel contract.
//!
//! These types are shared across the kernel traits
//! ([`GatewayFilter`](super::filter::GatewayFilter),
//! [`CategoryRouter`](super::router::CategoryRouter))
//! and carry no runtime dependencies beyond `serde` and `std`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP primitives
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method, covering the standard verbs used in REST and proxy scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Case-insensitive parse from a string slice.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// Return the standard uppercase string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// The admission-relevant view of an inbound request.
///
/// Bodies never pass through the filter chain; only the identity and routing
/// signals the gate needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Unique identifier for correlating this request across logs and traces.
    pub id: String,
    /// Request path, e.g. `/api/invitations/42/rsvp`.
    pub path: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// HTTP headers (header names are lowercased).
    pub headers: HashMap<String, String>,
    /// Peer address as reported by the transport, if known.
    pub remote_addr: Option<String>,
}

impl GatewayRequest {
    /// Construct a minimal request with the given id, path, and method.
    pub fn new(id: impl Into<String>, path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            method,
            headers: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Builder helper: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_lowercase(), value.into());
        self
    }

    /// Builder helper: set the transport peer address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Header lookup by (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// The outbound response as seen by the filter chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// HTTP status code (100–599).
    pub status: u16,
    /// Headers added by filters (lowercase names).
    pub headers: HashMap<String, String>,
    /// Time spent in the wrapped handler, in milliseconds.
    pub latency_ms: u64,
}

impl GatewayResponse {
    /// Construct a minimal response.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            latency_ms: 0,
        }
    }

    /// Builder helper: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_lowercase(), value.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request context
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable context that flows through the filter chain for a single request.
///
/// Filters read from and write to this context, enabling the response path
/// to see decisions made on the request path (e.g. the quota figures the
/// admission filter computed are turned into headers later).
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// The inbound request.
    pub request: GatewayRequest,
    /// Policy category assigned by the routing layer.
    pub category: String,
    /// Id of the route that matched, if any.
    pub route_id: Option<String>,
    /// Free-form attributes written and read by filters.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl GatewayContext {
    /// Create a fresh context from an inbound request and its category.
    pub fn new(request: GatewayRequest, category: impl Into<String>) -> Self {
        Self {
            request,
            category: category.into(),
            route_id: None,
            attributes: HashMap::new(),
        }
    }

    /// Builder: record the matched route.
    pub fn with_route_id(mut self, route_id: impl Into<String>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }

    /// Convenience: read a typed attribute, returning `None` if absent or
    /// if deserialization fails.
    pub fn get_attr<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Convenience: write a serializable attribute.
    pub fn set_attr<T: serde::Serialize>(&mut self, key: impl Into<String>, val: &T) {
        if let Ok(v) = serde_json::to_value(val) {
            self.attributes.insert(key.into(), v);
        }
    }
}
