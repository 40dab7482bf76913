//! Runtime configuration.

use serde::Deserialize;

use crate::error::ReactiveError;

/// Default bound on notification cycles started from inside listeners.
pub const DEFAULT_MAX_FLUSH_DEPTH: usize = 100;

/// Settings for a [`Runtime`](crate::reactive::Runtime).
///
/// ```rust
/// use cellgraph_core::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json(r#"{ "memoize": true }"#).unwrap();
/// assert!(config.memoize);
/// assert_eq!(config.max_flush_depth, cellgraph_core::config::DEFAULT_MAX_FLUSH_DEPTH);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Whether computed nodes memoize on dependency values unless their
    /// options say otherwise.
    pub memoize: bool,

    /// Maximum nesting of notification cycles. A listener that writes a cell
    /// starts a new cycle inside the one delivering it; past this depth the
    /// new cycle is dropped, since listeners keep re-triggering each other.
    /// The number of entities notified by one cycle is not limited.
    pub max_flush_depth: usize,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ReactiveError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the memoization default.
    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    /// Set the maximum notification cycle nesting.
    pub fn with_max_flush_depth(mut self, max_flush_depth: usize) -> Self {
        self.max_flush_depth = max_flush_depth;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memoize: false,
            max_flush_depth: DEFAULT_MAX_FLUSH_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn fields_override_defaults() {
        let config = RuntimeConfig::from_json(r#"{"memoize": true, "max_flush_depth": 5}"#).unwrap();
        assert!(config.memoize);
        assert_eq!(config.max_flush_depth, 5);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = RuntimeConfig::from_json(r#"{"memo": true}"#).unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }
}
