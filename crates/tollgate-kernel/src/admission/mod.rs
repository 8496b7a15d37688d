//! Admission kernel contract.
//!
//! This module defines the *trait interfaces and configuration types* for the
//! Tollgate admission gate.  No concrete implementations live here — those
//! belong in `tollgate-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              tollgate-kernel  (this module)                 │
//! │  Policy / PolicyTable      RouteConfig                      │
//! │  GatewayFilter trait       RecordStore trait                │
//! │  GatewayRequest/Response/Context  AdmissionConfig           │
//! │  AdmissionError                                             │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              tollgate-gateway  (runtime crate)              │
//! │  IdentityResolver   MemoryStore: impl RecordStore           │
//! │  CounterStore  BehaviorAnalyzer  penalty::block_duration    │
//! │  AdmissionGate  Reaper  CategoryRouter                      │
//! │  AdmissionFilter / LoggingFilter  GatewayServer (axum)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use tollgate_kernel::admission::{AdmissionConfig, PolicyTable, RouteConfig};
//!
//! let config = AdmissionConfig::new(PolicyTable::defaults())
//!     .with_route(RouteConfig::new("rsvp", "/api/invitations/{id}/rsvp", "rsvp"));
//!
//! config.validate().expect("admission config is valid");
//! assert_eq!(config.policies.resolve("guestbook").max_requests, 5);
//! ```

pub mod error;
pub mod filter;
pub mod policy;
pub mod router;
pub mod store;
pub mod validation;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use error::AdmissionError;
pub use filter::{FilterAction, FilterOrder, GatewayFilter, Rejection};
pub use policy::{DEFAULT_CATEGORY, Policy, PolicyOverride, PolicyTable};
pub use router::{CategoryRouter, RouteConfig};
pub use store::RecordStore;
pub use validation::{AdmissionConfig, AnalyzerConfig, GateTuning, MAX_THROTTLE_DELAY_MS};

// types module is pub so implementors in tollgate-gateway can use the structs
pub mod types;
pub use types::{GatewayContext, GatewayRequest, GatewayResponse, HttpMethod};
