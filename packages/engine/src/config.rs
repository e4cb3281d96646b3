//! Engine configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Default bound on convergence passes per digest cycle.
pub const DEFAULT_MAX_DIGEST_PASSES: usize = 10;

/// Configuration for a scope engine.
///
/// Loadable from JSON; missing fields fall back to their defaults:
///
/// ```rust
/// use scopewatch_engine::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{"non_scope_keys": ["$$cache"]}"#).unwrap();
/// assert_eq!(config.max_digest_passes, 10);
/// assert!(config.non_scope_keys.contains("$$cache"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of passes a digest cycle may run before it is aborted
    /// as non-converging. Values below 1 are treated as 1.
    pub max_digest_passes: usize,

    /// Keys whose values are stored opaquely: writes to them never schedule
    /// a digest or record foreign dependencies. Roots may override this.
    pub non_scope_keys: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_digest_passes: DEFAULT_MAX_DIGEST_PASSES,
            non_scope_keys: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_max_digest_passes(mut self, passes: usize) -> Self {
        self.max_digest_passes = passes;
        self
    }

    #[must_use]
    pub fn with_non_scope_key(mut self, key: impl Into<String>) -> Self {
        self.non_scope_keys.insert(key.into());
        self
    }

    pub(crate) fn pass_limit(&self) -> usize {
        self.max_digest_passes.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.max_digest_passes, 10);
        assert!(config.non_scope_keys.is_empty());
    }

    #[test]
    fn config_from_partial_json() {
        let config = EngineConfig::from_json(r#"{"max_digest_passes": 3}"#).unwrap();
        assert_eq!(config.max_digest_passes, 3);
        assert!(config.non_scope_keys.is_empty());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig::default()
            .with_max_digest_passes(4)
            .with_non_scope_key("$$watchers");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn zero_pass_limit_is_clamped() {
        let config = EngineConfig::default().with_max_digest_passes(0);
        assert_eq!(config.pass_limit(), 1);
    }
}
