//! Runtime settings of the gateway binary.
//!
//! Loaded through [`tollgate_kernel::config::load_layered`]: settings files
//! in order, then `TOLLGATE_*` environment overrides (`__` separates nested
//! keys, e.g. `TOLLGATE_ADMISSION__THROTTLE_THRESHOLD=70`). `admin_keys`
//! takes a comma-separated list: `TOLLGATE_ADMIN_KEYS=key-one,key-two`.
//!
//! ```toml
//! port = 8080
//! upstream_url = "http://127.0.0.1:3001"
//! trust_forwarded_for = true
//! admin_keys = ["change-me"]
//!
//! [policies.guestbook]
//! max_requests = 3
//!
//! [[routes]]
//! id = "guestbook"
//! path_pattern = "/api/guestbook"
//! methods = ["POST"]
//! category = "guestbook"
//!
//! [admission]
//! throttle_threshold = 60.0
//! ```

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tollgate_kernel::admission::{
    AdmissionConfig, AnalyzerConfig, GateTuning, PolicyOverride, PolicyTable, RouteConfig,
};
use tollgate_kernel::config::{ConfigError, EnvOverrides, load_layered_with};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TOLLGATE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// TCP port to listen on.
    pub port: u16,
    /// Interface to bind.
    pub bind_addr: String,
    /// Base URL admitted traffic is forwarded to. Without one, unmatched
    /// paths answer 404.
    pub upstream_url: Option<String>,
    pub upstream_timeout_ms: u64,
    /// Take the client address from `x-forwarded-for` / `x-real-ip`.
    pub trust_forwarded_for: bool,
    /// Operator keys accepted by the admin API. Empty disables it.
    pub admin_keys: Vec<String>,
    /// Per-category overrides merged onto the built-in policy table.
    pub policies: BTreeMap<String, PolicyOverride>,
    /// Path → category rules.
    pub routes: Vec<RouteConfig>,
    /// Throttle and reaper tuning.
    pub admission: GateTuning,
    /// Behaviour heuristics.
    pub analyzer: AnalyzerConfig,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_addr: "0.0.0.0".to_string(),
            upstream_url: None,
            upstream_timeout_ms: 30_000,
            trust_forwarded_for: false,
            admin_keys: Vec::new(),
            policies: BTreeMap::new(),
            routes: Vec::new(),
            admission: GateTuning::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl GatewaySettings {
    /// Load from `paths` (later files win) plus the environment, then
    /// validate.
    pub fn load(paths: &[&str]) -> GatewayResult<Self> {
        Self::load_with(paths, Self::env_overrides())
    }

    /// [`load`](Self::load) reading overrides from `vars` instead of the
    /// process environment.
    pub fn load_with_vars<K, V>(
        paths: &[&str],
        vars: impl IntoIterator<Item = (K, V)>,
    ) -> GatewayResult<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::load_with(paths, Self::env_overrides().with_vars(vars))
    }

    fn env_overrides() -> EnvOverrides {
        EnvOverrides::new(ENV_PREFIX).with_list_key("admin_keys")
    }

    fn load_with(paths: &[&str], env: EnvOverrides) -> GatewayResult<Self> {
        let settings: Self = load_layered_with(paths, &env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// The admission configuration these settings describe.
    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            policies: PolicyTable::defaults().with_overrides(&self.policies),
            routes: self.routes.clone(),
            gate: self.admission.clone(),
            analyzer: self.analyzer.clone(),
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        self.admission_config().validate()?;
        if let Some(url) = &self.upstream_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GatewayError::Settings(ConfigError::Parse(format!(
                    "upstream_url must be an http(s) URL, got '{url}'"
                ))));
            }
        }
        if self.upstream_timeout_ms == 0 {
            return Err(GatewayError::Settings(ConfigError::Parse(
                "upstream_timeout_ms must be greater than 0".to_string(),
            )));
        }
        Ok(())
    }
}
