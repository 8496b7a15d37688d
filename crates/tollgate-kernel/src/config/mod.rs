//! Layered configuration loading.
//!
//! Settings files may be written in YAML, TOML, JSON, INI, RON or JSON5; the
//! format is picked from the file extension. `${VAR}` and `$VAR` references
//! are substituted from the environment before parsing, later files override
//! earlier ones, and prefixed environment variables override everything.

use config::{Config as Cfg, Environment, File};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

pub use config::{FileFormat, Map};


/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced env var pattern is valid")
});

static BARE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("bare env var pattern is valid")
});

/// Detect configuration format from file extension
///
/// | Extension | Format |
/// |-----------|--------|
/// | `.yaml`, `.yml` | YAML |
/// | `.toml` | TOML |
/// | `.json` | JSON |
/// | `.ini` | INI |
/// | `.ron` | RON |
/// | `.json5` | JSON5 |
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// Supports both `${VAR_NAME}` and `$VAR_NAME`. Unset variables are left
/// untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Parse configuration from a string with an explicit format.
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Source of the environment overrides applied by [`load_layered_with`].
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Variable prefix, e.g. `TOLLGATE`.
    pub prefix: String,
    /// Keys whose value is a comma-separated list.
    pub list_keys: Vec<String>,
    /// Explicit variables; `None` reads the process environment.
    pub vars: Option<Map<String, String>>,
}

impl EnvOverrides {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Builder: parse `key` as a comma-separated list.
    pub fn with_list_key(mut self, key: impl Into<String>) -> Self {
        self.list_keys.push(key.into());
        self
    }

    /// Builder: read overrides from `vars` instead of the process environment.
    pub fn with_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    fn source(&self) -> Environment {
        let mut env = Environment::with_prefix(&self.prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(self.vars.clone());
        if !self.list_keys.is_empty() {
            env = env.list_separator(",");
            for key in &self.list_keys {
                env = env.with_list_parse_key(key);
            }
        }
        env
    }
}

/// Load configuration from several files, later files overriding earlier
/// ones, then apply environment overrides.
///
/// Environment variables use `env_prefix` and `__` for nesting, so with the
/// prefix `TOLLGATE` the key `admission.throttle_threshold` is overridden by
/// `TOLLGATE_ADMISSION__THROTTLE_THRESHOLD`. An empty `paths` slice yields
/// whatever the environment (and serde defaults) provide.
pub fn load_layered<T>(paths: &[&str], env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    load_layered_with(paths, &EnvOverrides::new(env_prefix))
}

/// [`load_layered`] with full control over the environment source.
pub fn load_layered_with<T>(paths: &[&str], env: &EnvOverrides) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();

    for path in paths {
        debug!(path, "loading settings file");
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content);
        builder = builder.add_source(File::from_str(&substituted, format));
    }

    debug!(prefix = %env.prefix, explicit = env.vars.is_some(), "applying environment overrides");
    let config = builder
        .add_source(env.source())
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}
