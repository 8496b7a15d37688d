//! Priority-ordered path-template router implementing [`CategoryRouter`].
//!
//! Routes are kept sorted by descending priority and resolved by a linear
//! scan. Templates support `{param}` (exactly one segment) and a trailing
//! `{*rest}` (one or more remaining segments). Route tables are small, so
//! O(R × D) lookups are fine.

use tollgate_kernel::admission::{
    AdmissionError, CategoryRouter, DEFAULT_CATEGORY, HttpMethod, RouteConfig,
};

/// [`CategoryRouter`] over `{param}` / `{*rest}` templates.
#[derive(Debug, Default)]
pub struct PatternRouter {
    /// Sorted by descending priority; ties keep registration order.
    routes: Vec<RouteConfig>,
}

impl PatternRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from an already validated route list.
    pub fn from_routes(
        routes: impl IntoIterator<Item = RouteConfig>,
    ) -> Result<Self, AdmissionError> {
        let mut router = Self::new();
        for route in routes {
            router.register(route)?;
        }
        Ok(router)
    }

    /// Category for `(path, method)`, falling back to `default`.
    pub fn category_for(&self, path: &str, method: &HttpMethod) -> &str {
        self.resolve(path, method)
            .map_or(DEFAULT_CATEGORY, |route| route.category.as_str())
    }

    fn matches(template: &str, path: &str) -> bool {
        let t_parts: Vec<&str> = template.trim_matches('/').split('/').collect();
        let p_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

        for (i, t) in t_parts.iter().enumerate() {
            if t.starts_with("{*") && t.ends_with('}') {
                // Wildcard must be last and needs at least one segment.
                return i + 1 == t_parts.len()
                    && p_parts.len() > i
                    && p_parts[i..].iter().any(|p| !p.is_empty());
            }
            let Some(p) = p_parts.get(i) else {
                return false;
            };
            let is_param = t.starts_with('{') && t.ends_with('}');
            if is_param {
                if p.is_empty() {
                    return false;
                }
            } else if t != p {
                return false;
            }
        }
        t_parts.len() == p_parts.len()
    }
}

impl CategoryRouter for PatternRouter {
    fn register(&mut self, route: RouteConfig) -> Result<(), AdmissionError> {
        if self.routes.iter().any(|r| r.id == route.id) {
            return Err(AdmissionError::DuplicateRoute(route.id));
        }
        let pos = self.routes.partition_point(|r| r.priority >= route.priority);
        self.routes.insert(pos, route);
        Ok(())
    }

    fn resolve(&self, path: &str, method: &HttpMethod) -> Option<&RouteConfig> {
        self.routes.iter().find(|route| {
            (route.methods.is_empty() || route.methods.contains(method))
                && Self::matches(&route.path_pattern, path)
        })
    }

    fn routes(&self) -> Vec<&RouteConfig> {
        self.routes.iter().collect()
    }

    fn deregister(&mut self, route_id: &str) -> Result<(), AdmissionError> {
        let before = self.routes.len();
        self.routes.retain(|r| r.id != route_id);
        if self.routes.len() == before {
            return Err(AdmissionError::RouteNotFound(route_id.to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, pattern: &str, category: &str) -> RouteConfig {
        RouteConfig::new(id, pattern, category)
    }

    #[test]
    fn exact_path_matches() {
        let mut router = PatternRouter::new();
        router.register(route("gb", "/api/guestbook", "guestbook")).unwrap();
        let r = router.resolve("/api/guestbook", &HttpMethod::Post).unwrap();
        assert_eq!(r.category, "guestbook");
        assert!(router.resolve("/api/guestbook/extra", &HttpMethod::Post).is_none());
    }

    #[test]
    fn param_segment_matches_any_single_segment() {
        let mut router = PatternRouter::new();
        router
            .register(route("rsvp", "/api/invitations/{id}/rsvp", "rsvp"))
            .unwrap();
        assert!(router.resolve("/api/invitations/42/rsvp", &HttpMethod::Post).is_some());
        assert!(router.resolve("/api/invitations/42/43/rsvp", &HttpMethod::Post).is_none());
        assert!(router.resolve("/api/invitations//rsvp", &HttpMethod::Post).is_none());
    }

    #[test]
    fn trailing_wildcard_matches_the_rest() {
        let mut router = PatternRouter::new();
        router.register(route("admin", "/admin/{*rest}", "admin")).unwrap();
        assert!(router.resolve("/admin/admission/stats", &HttpMethod::Get).is_some());
        assert!(router.resolve("/admin/x", &HttpMethod::Get).is_some());
        assert!(router.resolve("/admin", &HttpMethod::Get).is_none());
        assert!(router.resolve("/administrator", &HttpMethod::Get).is_none());
    }

    #[test]
    fn unmatched_paths_fall_back_to_default() {
        let mut router = PatternRouter::new();
        router.register(route("gb", "/api/guestbook", "guestbook")).unwrap();
        assert_eq!(router.category_for("/photos", &HttpMethod::Get), DEFAULT_CATEGORY);
        assert_eq!(router.category_for("/api/guestbook", &HttpMethod::Get), "guestbook");
    }

    #[test]
    fn method_filter_respected() {
        let mut router = PatternRouter::new();
        router
            .register(
                route("gb-write", "/api/guestbook", "guestbook")
                    .with_methods(vec![HttpMethod::Post]),
            )
            .unwrap();
        assert!(router.resolve("/api/guestbook", &HttpMethod::Get).is_none());
        assert!(router.resolve("/api/guestbook", &HttpMethod::Post).is_some());
    }

    #[test]
    fn higher_priority_wins() {
        let mut router = PatternRouter::new();
        router
            .register(route("any-api", "/api/{*rest}", "read").with_priority(0))
            .unwrap();
        router
            .register(route("codes", "/api/guest-codes/{code}", "guestCodes").with_priority(10))
            .unwrap();
        assert_eq!(
            router.category_for("/api/guest-codes/ABC123", &HttpMethod::Get),
            "guestCodes"
        );
        assert_eq!(router.category_for("/api/photos/1", &HttpMethod::Get), "read");
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let router = PatternRouter::from_routes([
            route("first", "/api/{x}", "rsvp"),
            route("second", "/api/{y}", "read"),
        ])
        .unwrap();
        assert_eq!(router.category_for("/api/z", &HttpMethod::Get), "rsvp");
        let ids: Vec<&str> = router.routes().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
    }

    #[test]
    fn duplicate_route_id_rejected() {
        let mut router = PatternRouter::new();
        router.register(route("r1", "/a", "read")).unwrap();
        let err = router.register(route("r1", "/b", "read")).unwrap_err();
        assert_eq!(err, AdmissionError::DuplicateRoute("r1".to_string()));
    }

    #[test]
    fn deregister_removes_route() {
        let mut router = PatternRouter::new();
        router.register(route("r1", "/a", "read")).unwrap();
        router.deregister("r1").unwrap();
        assert!(router.resolve("/a", &HttpMethod::Get).is_none());
        assert_eq!(
            router.deregister("r1"),
            Err(AdmissionError::RouteNotFound("r1".to_string()))
        );
    }
}
