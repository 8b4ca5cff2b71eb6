//! Repository configuration
//!
//! Plain-data toggles for the builder, loadable from JSON.
//!
//! # Example
//! ```ignore
//! use lumbung::{RepoBuilder, RepoConfig};
//!
//! let config = RepoConfig::from_json(r#"{"access": "direct", "cache": true}"#)?;
//! let repo = RepoBuilder::<Employee>::new().config(config).primary_key("id").build()?;
//! ```

use crate::attr::AccessMode;
use crate::error::{RepoError, Result};
use crate::index::DEFAULT_BUCKET_SIZE;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Toggles applied by `RepoBuilder::config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Accessor backend
    pub access: AccessMode,
    /// Prefer getter/setter properties over plain fields
    pub property_access: bool,
    /// Cache named predicate results until the next mutation
    pub cache: bool,
    /// Store and return detached copies
    pub clone_edits: bool,
    /// Reject null keys and null values
    pub null_checks: bool,
    /// Log every edit at `log_level`
    pub logging: bool,
    /// Level name: error, warn, info, debug, trace
    pub log_level: String,
    /// Log edit details at DEBUG
    pub debug: bool,
    /// Deliver modification events to listeners
    pub events: bool,
    /// Drop duplicate records from multi-index results
    pub remove_duplication: bool,
    /// Initial bucket size of every index not configured otherwise
    pub bucket_size: usize,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            access: AccessMode::default(),
            property_access: false,
            cache: false,
            clone_edits: false,
            null_checks: false,
            logging: false,
            log_level: "trace".to_string(),
            debug: false,
            events: false,
            remove_duplication: false,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

impl RepoConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RepoError::config(format!("invalid repository config: {e}")))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parsed log level; unknown names fall back to TRACE.
    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::TRACE)
    }
}

impl AccessMode {
    pub fn name(&self) -> &'static str {
        match self {
            AccessMode::Reflective => "reflective",
            AccessMode::Direct => "direct",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepoConfig::default();
        assert_eq!(config.access, AccessMode::Reflective);
        assert_eq!(config.bucket_size, 3);
        assert_eq!(config.level(), Level::TRACE);
        assert!(!config.cache && !config.clone_edits && !config.events && !config.debug);
    }

    #[test]
    fn test_from_json_partial() {
        let config = RepoConfig::from_json(r#"{"access": "direct", "cache": true, "log_level": "warn"}"#).unwrap();
        assert_eq!(config.access, AccessMode::Direct);
        assert!(config.cache);
        assert_eq!(config.level(), Level::WARN);
        assert_eq!(config.bucket_size, 3);

        let back = RepoConfig::from_json(&config.to_json()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_bad_json_is_configuration_error() {
        assert!(matches!(RepoConfig::from_json("{"), Err(RepoError::Configuration(_))));
    }

    #[test]
    fn test_access_mode_from_str() {
        assert_eq!(AccessMode::from_str("UNSAFE"), AccessMode::Direct);
        assert_eq!(AccessMode::from_str("reflect"), AccessMode::Reflective);
        assert_eq!(AccessMode::from_str("whatever"), AccessMode::Reflective);
        assert_eq!(AccessMode::Direct.name(), "direct");
    }
}
