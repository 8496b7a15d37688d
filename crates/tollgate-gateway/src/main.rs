//! Tollgate admission gateway — entry point.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TOLLGATE_CONFIG` | *(none)* | Comma-separated settings files, later ones win. |
//! | `TOLLGATE_<KEY>` | | Override any setting, `__` between nested keys. |
//! | `TOLLGATE_ADMIN_KEYS` | *(none)* | Comma-separated operator keys for the admin API. |
//! | `RUST_LOG` | `tollgate_gateway=info` | Log filter. |

use tollgate_gateway::server::GatewayServer;
use tollgate_gateway::settings::GatewaySettings;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(
            "tollgate_gateway=info"
                .parse()
                .unwrap_or_else(|_| LevelFilter::INFO.into()),
        )
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_paths = std::env::var("TOLLGATE_CONFIG").unwrap_or_default();
    let paths: Vec<&str> = config_paths
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        warn!("TOLLGATE_CONFIG is not set, running with built-in defaults");
    }

    let settings = match GatewaySettings::load(&paths) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        port = settings.port,
        upstream = ?settings.upstream_url,
        trust_forwarded_for = settings.trust_forwarded_for,
        admin_api = !settings.admin_keys.is_empty(),
        policy_overrides = settings.policies.len(),
        "configuration loaded"
    );

    if let Err(e) = GatewayServer::new(settings).start().await {
        error!(error = %e, "gateway error");
        std::process::exit(1);
    }
}
