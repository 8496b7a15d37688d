//! `tollgate-kernel` — contracts for adaptive request admission.
//!
//! Nothing in this crate touches the network or spawns tasks. It holds the
//! policy table, the request/response/context types that flow through a
//! filter chain, the [`admission::GatewayFilter`] and
//! [`admission::RecordStore`] traits, the [`clock::Clock`] abstraction and
//! the multi-format configuration loader. The runtime lives in
//! `tollgate-gateway`.

// admission contracts
pub mod admission;

// time source
pub mod clock;

// configuration loader
#[cfg(feature = "config")]
pub mod config;

pub use clock::{Clock, ManualClock, SystemClock};
