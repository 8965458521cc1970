//! Pipeline configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

const fn default_max_batch_size() -> usize {
    1000
}

const fn default_max_total_per_run() -> usize {
    0 // unlimited
}

const fn default_flush_interval() -> usize {
    10
}

const fn default_throttle_micros() -> u64 {
    0
}

const fn default_max_consecutive_transient_errors() -> u32 {
    5
}

fn default_transient_error_patterns() -> Vec<String> {
    vec![
        "failed to write to socket".to_string(),
        "failed to set sender".to_string(),
    ]
}

#[allow(clippy::unnecessary_wraps, reason = "serde default for an optional field")]
const fn default_transport_timeout_secs() -> Option<u64> {
    Some(60)
}

const fn default_page_size() -> usize {
    500
}

fn default_language() -> String {
    "en_US".to_string()
}

/// Tunables for a pipeline run
///
/// # Example
///
/// ```ron
/// (
///     max_batch_size: 500,
///     max_total_per_run: 20000,
///     throttle_micros: 2000,
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of recipients composed and sent together
    ///
    /// Default: 1000
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Ceiling on recipients taken from the queue in one run; `0` disables
    /// the ceiling. Work beyond it is deferred to the next run.
    ///
    /// Default: 0
    #[serde(default = "default_max_total_per_run")]
    pub max_total_per_run: usize,

    /// Deliveries accumulated before results are flushed to the job store
    ///
    /// Default: 10
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,

    /// Delay after every transport call, in microseconds; `0` disables it
    ///
    /// Default: 0
    #[serde(default = "default_throttle_micros")]
    pub throttle_micros: u64,

    /// Consecutive transient transport errors tolerated before the run is
    /// aborted
    ///
    /// Default: 5
    #[serde(default = "default_max_consecutive_transient_errors")]
    pub max_consecutive_transient_errors: u32,

    /// Case-insensitive substrings that mark an unclassified transport error
    /// as transient
    #[serde(default = "default_transient_error_patterns")]
    pub transient_error_patterns: Vec<String>,

    /// Upper bound on a single transport call; a timed out call counts as a
    /// transient error. `None` or `0` waits indefinitely.
    ///
    /// Default: 60 seconds
    #[serde(default = "default_transport_timeout_secs")]
    pub transport_timeout_secs: Option<u64>,

    /// Rows per page of a queue built with
    /// [`MemoryMailStore::from_config`](crate::backends::MemoryMailStore::from_config)
    ///
    /// Default: 500
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Run every mailing through this pipeline instead of abdicating older
    /// ones to the legacy path
    ///
    /// Default: false
    #[serde(default)]
    pub force_pipeline: bool,

    /// Locale that needs no switch before rendering
    ///
    /// Default: `en_US`
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_total_per_run: default_max_total_per_run(),
            flush_interval: default_flush_interval(),
            throttle_micros: default_throttle_micros(),
            max_consecutive_transient_errors: default_max_consecutive_transient_errors(),
            transient_error_patterns: default_transient_error_patterns(),
            transport_timeout_secs: default_transport_timeout_secs(),
            page_size: default_page_size(),
            force_pipeline: false,
            default_language: default_language(),
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from RON, applying defaults for missing fields
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid RON or fails validation.
    pub fn from_ron(input: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            ron::from_str(input).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the pipeline depends on
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_batch_size == 0 {
            return Err(ConfigurationError::Invalid {
                field: "max_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.flush_interval == 0 {
            return Err(ConfigurationError::Invalid {
                field: "flush_interval",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.page_size == 0 {
            return Err(ConfigurationError::Invalid {
                field: "page_size",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    #[must_use]
    pub const fn throttle(&self) -> Duration {
        Duration::from_micros(self.throttle_micros)
    }

    #[must_use]
    pub fn transport_timeout(&self) -> Option<Duration> {
        self.transport_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_batch_size, 1000);
        assert_eq!(config.max_total_per_run, 0);
        assert_eq!(config.flush_interval, 10);
        assert_eq!(config.max_consecutive_transient_errors, 5);
        assert_eq!(config.throttle(), Duration::ZERO);
        assert_eq!(config.transport_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.default_language, "en_US");
        assert!(!config.force_pipeline);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_ron_fills_defaults() {
        let config = PipelineConfig::from_ron(
            r"(
                max_batch_size: 50,
                max_total_per_run: 200,
                throttle_micros: 1500,
                transport_timeout_secs: None,
            )",
        )
        .expect("valid config");

        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.max_total_per_run, 200);
        assert_eq!(config.throttle(), Duration::from_micros(1500));
        assert_eq!(config.transport_timeout(), None);
        assert_eq!(config.flush_interval, 10);
        assert_eq!(config.transient_error_patterns.len(), 2);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = PipelineConfig {
            transport_timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.transport_timeout(), None);
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        let error = PipelineConfig::from_ron("(max_batch_size: 0)").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid configuration for max_batch_size: must be at least 1"
        );

        let config = PipelineConfig {
            flush_interval: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Invalid {
                field: "flush_interval",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_ron_is_a_parse_error() {
        let error = PipelineConfig::from_ron("(max_batch_size: \"lots\")").unwrap_err();
        assert!(matches!(error, ConfigurationError::Parse(_)));
    }
}
