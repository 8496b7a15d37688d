//! `tollgate-gateway` — adaptive request admission runtime.
//!
//! This crate provides the concrete implementations of the admission kernel
//! contracts defined in `tollgate-kernel::admission`:
//!
//! | Kernel contract | Implementation |
//! |----------------|----------------|
//! | [`RecordStore`](admission::RecordStore) | [`store::MemoryStore`] |
//! | [`CategoryRouter`](admission::CategoryRouter) | [`router::PatternRouter`] |
//! | [`GatewayFilter`](admission::GatewayFilter) | [`filter::AdmissionFilter`], [`filter::OperatorKeyFilter`], [`filter::LoggingFilter`] |
//!
//! The decision logic lives in [`gate::AdmissionGate`], built from the
//! [`identity`] resolver, the [`quota`] counter store, the [`behavior`]
//! analyzer and the [`penalty`] calculator. [`reaper::Reaper`] evicts idle
//! records in the background and [`server::GatewayServer`] exposes it all as
//! an axum HTTP service in front of an upstream.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tollgate_gateway::server::GatewayServer;
//! use tollgate_gateway::settings::GatewaySettings;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = GatewaySettings {
//!         upstream_url: Some("http://127.0.0.1:3001".to_string()),
//!         ..GatewaySettings::default()
//!     };
//!     GatewayServer::new(settings).start().await.unwrap();
//! }
//! ```

pub mod backend;
pub mod behavior;
pub mod error;
pub mod filter;
pub mod gate;
pub mod identity;
pub mod penalty;
pub mod quota;
pub mod reaper;
pub mod router;
pub mod server;
pub mod settings;
pub mod store;

// Re-export the kernel admission types for convenience.
pub use tollgate_kernel::admission;
pub use tollgate_kernel::{Clock, ManualClock, SystemClock};
