//! Category routing contract.
//!
//! The gate never decides which category a request belongs to; it consumes a
//! static table of [`RouteConfig`] entries. [`CategoryRouter`] is the lookup
//! abstraction over that table.

use super::error::AdmissionError;
use super::types::HttpMethod;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Route configuration
// ─────────────────────────────────────────────────────────────────────────────

/// A single rule mapping a path pattern + method set to a policy category.
///
/// Path patterns follow the `{param}` template syntax used by axum 0.8+:
/// ```text
/// /api/guestbook                    — exact path
/// /api/invitations/{id}/rsvp        — `{id}` matches any one segment
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Unique stable identifier for this route.
    pub id: String,
    /// URL path template.  Must begin with `/`.
    pub path_pattern: String,
    /// Accepted HTTP methods.  An empty vec means *all* methods are accepted.
    #[serde(default)]
    pub methods: Vec<HttpMethod>,
    /// Policy category applied to matching requests.
    pub category: String,
    /// Routing priority: higher values are evaluated first when multiple
    /// patterns match the same path.
    #[serde(default)]
    pub priority: i32,
}

impl RouteConfig {
    /// Create a minimal route with just id, path_pattern, and category.
    pub fn new(
        id: impl Into<String>,
        path_pattern: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path_pattern: path_pattern.into(),
            methods: Vec::new(),
            category: category.into(),
            priority: 0,
        }
    }

    /// Builder: restrict to specific HTTP methods.
    pub fn with_methods(mut self, methods: Vec<HttpMethod>) -> Self {
        self.methods = methods;
        self
    }

    /// Builder: set routing priority (higher = evaluated first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Basic sanity checks run during [`AdmissionConfig::validate()`](super::AdmissionConfig::validate).
    pub(crate) fn validate(&self) -> Result<(), AdmissionError> {
        if self.id.trim().is_empty() {
            return Err(AdmissionError::EmptyRouteId);
        }
        if self.path_pattern.trim().is_empty() {
            return Err(AdmissionError::InvalidPathPattern(
                self.id.clone(),
                "path pattern cannot be empty".to_string(),
            ));
        }
        if !self.path_pattern.starts_with('/') {
            return Err(AdmissionError::InvalidPathPattern(
                self.id.clone(),
                "path pattern must start with '/'".to_string(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(AdmissionError::EmptyCategory);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for category lookup.
///
/// The trait is intentionally synchronous: lookups run on every request and
/// must not perform I/O.
pub trait CategoryRouter: Send + Sync {
    /// Register a new route.  Returns [`AdmissionError::DuplicateRoute`] if a
    /// route with the same `id` is already registered.
    fn register(&mut self, route: RouteConfig) -> Result<(), AdmissionError>;

    /// Resolve `(path, method)` to the best matching route, if any.
    fn resolve(&self, path: &str, method: &HttpMethod) -> Option<&RouteConfig>;

    /// Return all registered routes, sorted by descending priority.
    fn routes(&self) -> Vec<&RouteConfig>;

    /// Remove a previously registered route.
    fn deregister(&mut self, route_id: &str) -> Result<(), AdmissionError>;
}
