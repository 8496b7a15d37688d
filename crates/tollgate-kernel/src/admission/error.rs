//! Admission error types for `tollgate-kernel`.
//!
//! [`AdmissionError`] covers every failure mode that can be detected at
//! *definition time* — empty categories, zero quotas, nonsensical penalty
//! multipliers, malformed routes — before any request is admitted.
//! Admission itself never fails: every request ends in a decision.

use thiserror::Error;

/// Configuration error type for the admission kernel contract.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AdmissionError {
    // ── Policies ─────────────────────────────────────────────────────────────
    /// A policy category name is empty or whitespace-only.
    #[error("policy category cannot be empty")]
    EmptyCategory,

    /// The policy table has no `default` entry to fall back on.
    #[error("policy table must define a '{0}' category")]
    MissingDefaultPolicy(String),

    /// `max_requests` is zero, which would reject every request.
    #[error("policy '{0}' must allow at least one request per window")]
    InvalidQuota(String),

    /// `window_ms` is zero.
    #[error("policy '{0}' must have a window greater than 0 ms")]
    InvalidWindow(String),

    /// The delay multiplier is below 1.0 or not a finite number; penalties
    /// would shrink as violations grow.
    #[error("policy '{0}' has an invalid delay multiplier: {1}")]
    InvalidMultiplier(String, String),

    /// Two categories differ only in letter case and cannot be told apart
    /// by lowercased config keys.
    #[error("policy categories '{0}' and '{1}' differ only in case")]
    CategoryCaseCollision(String, String),

    // ── Routes ───────────────────────────────────────────────────────────────
    /// A route `id` field is empty or whitespace-only.
    #[error("route id cannot be empty")]
    EmptyRouteId,

    /// A route with this id has already been registered.
    #[error("route '{0}' is already registered")]
    DuplicateRoute(String),

    /// No route with this id is currently registered.
    #[error("route '{0}' is not registered")]
    RouteNotFound(String),

    /// A route path pattern is syntactically invalid.
    #[error("route '{0}' has an invalid path pattern: {1}")]
    InvalidPathPattern(String, String),

    /// A route references a category that is not present in the policy table.
    #[error("route '{0}' references unknown category '{1}'")]
    UnknownCategory(String, String),

    // ── Gate tuning ──────────────────────────────────────────────────────────
    /// An interval or TTL used by the gate or reaper is zero.
    #[error("{0} must be greater than 0 ms")]
    InvalidInterval(&'static str),

    /// A throttle figure is negative, not finite, or above the delay cap.
    #[error("invalid {0}: {1}")]
    InvalidThrottle(&'static str, String),

    // ── Filters ──────────────────────────────────────────────────────────────
    /// A filter could not process a request or response.
    #[error("filter '{0}' failed: {1}")]
    FilterFailed(String, String),
}
