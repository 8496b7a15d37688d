//! Per-category admission policies.
//!
//! A [`Policy`] fixes the quota (`max_requests` per `window_ms`) and the
//! penalty curve (`delay_multiplier`, `max_delay_ms`) for one category of
//! endpoints. [`PolicyTable::defaults`] reproduces the built-in table; sensitive
//! write categories get tighter windows and steeper penalties.

use super::error::AdmissionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Category used when a request's category has no policy of its own.
pub const DEFAULT_CATEGORY: &str = "default";

/// Multiplier applied when a policy does not name one.
pub const DEFAULT_DELAY_MULTIPLIER: f64 = 1.5;

fn default_delay_multiplier() -> f64 {
    DEFAULT_DELAY_MULTIPLIER
}

/// Quota and penalty settings for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Base of the exponential block-duration curve.
    #[serde(default = "default_delay_multiplier")]
    pub delay_multiplier: f64,
    /// Upper bound on any block duration.
    pub max_delay_ms: u64,
    /// Human-readable message returned with a rejection.
    pub rejection_message: String,
}

impl Policy {
    pub fn new(
        max_requests: u32,
        window_ms: u64,
        delay_multiplier: f64,
        max_delay_ms: u64,
        rejection_message: impl Into<String>,
    ) -> Self {
        Self {
            max_requests,
            window_ms,
            delay_multiplier,
            max_delay_ms,
            rejection_message: rejection_message.into(),
        }
    }

    pub(crate) fn validate(&self, category: &str) -> Result<(), AdmissionError> {
        if self.max_requests == 0 {
            return Err(AdmissionError::InvalidQuota(category.to_string()));
        }
        if self.window_ms == 0 {
            return Err(AdmissionError::InvalidWindow(category.to_string()));
        }
        if !self.delay_multiplier.is_finite() || self.delay_multiplier < 1.0 {
            return Err(AdmissionError::InvalidMultiplier(
                category.to_string(),
                self.delay_multiplier.to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial policy used to override entries of the built-in table from
/// configuration. Unset fields keep the value already in the table (or the
/// `default` policy's value for a brand-new category).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverride {
    pub max_requests: Option<u32>,
    pub window_ms: Option<u64>,
    pub delay_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub rejection_message: Option<String>,
}

impl PolicyOverride {
    fn apply_to(&self, mut policy: Policy) -> Policy {
        if let Some(v) = self.max_requests {
            policy.max_requests = v;
        }
        if let Some(v) = self.window_ms {
            policy.window_ms = v;
        }
        if let Some(v) = self.delay_multiplier {
            policy.delay_multiplier = v;
        }
        if let Some(v) = self.max_delay_ms {
            policy.max_delay_ms = v;
        }
        if let Some(v) = &self.rejection_message {
            policy.rejection_message = v.clone();
        }
        policy
    }
}

static BUILTIN_DEFAULT: LazyLock<Policy> = LazyLock::new(|| {
    Policy::new(
        100,
        60_000,
        1.5,
        30_000,
        "Too many requests. Please slow down and try again shortly.",
    )
});

/// Immutable mapping from category name to [`Policy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    policies: BTreeMap<String, Policy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PolicyTable {
    /// An empty table. Every lookup falls through to the built-in default.
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// The built-in table.
    pub fn defaults() -> Self {
        Self::empty()
            .with_policy(DEFAULT_CATEGORY, BUILTIN_DEFAULT.clone())
            .with_policy(
                "rsvp",
                Policy::new(
                    10,
                    60_000,
                    2.0,
                    60_000,
                    "Too many RSVP submissions. Please wait a moment before trying again.",
                ),
            )
            .with_policy(
                "guestbook",
                Policy::new(
                    5,
                    60_000,
                    2.0,
                    120_000,
                    "Too many guestbook messages. Please wait before posting again.",
                ),
            )
            .with_policy(
                "auth",
                Policy::new(
                    5,
                    900_000,
                    3.0,
                    300_000,
                    "Too many sign-in attempts. Please try again later.",
                ),
            )
            .with_policy(
                "admin",
                Policy::new(
                    30,
                    60_000,
                    1.5,
                    60_000,
                    "Too many administrative requests. Please slow down.",
                ),
            )
            .with_policy(
                "read",
                Policy::new(
                    200,
                    60_000,
                    1.2,
                    10_000,
                    "Too many requests. Please slow down.",
                ),
            )
            .with_policy(
                "guestCodes",
                Policy::new(
                    3,
                    60_000,
                    3.0,
                    180_000,
                    "Too many guest code attempts. Please wait before trying again.",
                ),
            )
    }

    /// Builder: insert or replace a category.
    pub fn with_policy(mut self, category: impl Into<String>, policy: Policy) -> Self {
        self.policies.insert(category.into(), policy);
        self
    }

    /// Patch the table with configuration overrides.
    ///
    /// Override keys match existing categories ignoring ASCII case, since
    /// layered config sources lowercase their keys (`guestcodes` patches
    /// `guestCodes`). Keys matching nothing seed a new category from
    /// `default`.
    pub fn with_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a String, &'a PolicyOverride)>,
    ) -> Self {
        for (key, patch) in overrides {
            let category = self.canonical_category(key);
            let base = self
                .policies
                .get(&category)
                .cloned()
                .unwrap_or_else(|| self.resolve(DEFAULT_CATEGORY).clone());
            self.policies.insert(category, patch.apply_to(base));
        }
        self
    }

    fn canonical_category(&self, name: &str) -> String {
        if self.policies.contains_key(name) {
            return name.to_string();
        }
        self.policies
            .keys()
            .find(|known| known.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Policy for `category`, falling back to `default` for unknown names.
    pub fn resolve(&self, category: &str) -> &Policy {
        self.policies
            .get(category)
            .or_else(|| self.policies.get(DEFAULT_CATEGORY))
            .unwrap_or(&BUILTIN_DEFAULT)
    }

    /// Exact lookup without fallback.
    pub fn get(&self, category: &str) -> Option<&Policy> {
        self.policies.get(category)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.policies.contains_key(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Check every entry and require a `default` category.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if !self.policies.contains_key(DEFAULT_CATEGORY) {
            return Err(AdmissionError::MissingDefaultPolicy(
                DEFAULT_CATEGORY.to_string(),
            ));
        }
        let mut folded: BTreeMap<String, &str> = BTreeMap::new();
        for (category, policy) in &self.policies {
            if category.trim().is_empty() {
                return Err(AdmissionError::EmptyCategory);
            }
            if let Some(other) = folded.insert(category.to_ascii_lowercase(), category) {
                return Err(AdmissionError::CategoryCaseCollision(
                    other.to_string(),
                    category.clone(),
                ));
            }
            policy.validate(category)?;
        }
        Ok(())
    }
}
