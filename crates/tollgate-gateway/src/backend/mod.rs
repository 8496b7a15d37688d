//! Upstream backends.

mod upstream;

pub use upstream::UpstreamBackend;
