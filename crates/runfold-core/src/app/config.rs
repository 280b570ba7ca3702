//! AggregatorConfig - aggregator の設定
//!
//! JSON から読み込めます。省略したフィールドはデフォルト値になります。

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tuning knobs of `RunArtifactsAggregator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Upper bound on fetches running at the same time. `None` = unbounded.
    ///
    /// Every key still gets its fetch issued immediately; the cap only
    /// queues them.
    pub max_concurrent_fetches: Option<usize>,

    /// Capacity of the command channel between callers and the merge loop.
    pub command_buffer: usize,

    /// Sub-path inside each run's artifact root to list. `None` = root.
    pub artifact_path: Option<String>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: None,
            command_buffer: 64,
            artifact_path: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AggregatorConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = Some(n);
        self
    }

    pub fn with_artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_fetches == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::Invalid(
                "command_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_config_has_reasonable_values() {
        let config = AggregatorConfig::default();
        assert_eq!(config.max_concurrent_fetches, None);
        assert_eq!(config.command_buffer, 64);
        assert_eq!(config.artifact_path, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = AggregatorConfig::from_json_str(r#"{"max_concurrent_fetches": 4}"#).unwrap();
        assert_eq!(config.max_concurrent_fetches, Some(4));
        assert_eq!(config.command_buffer, 64);
    }

    #[rstest]
    #[case::zero_concurrency(r#"{"max_concurrent_fetches": 0}"#)]
    #[case::zero_buffer(r#"{"command_buffer": 0}"#)]
    fn invalid_values_are_rejected(#[case] json: &str) {
        let err = AggregatorConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = AggregatorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = AggregatorConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
