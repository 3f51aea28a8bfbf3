//! Historian configuration.
//!
//! Configuration for the remote historian, including:
//! - Static labels added to every written stream
//! - The default query window
//! - The recording policy

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};
use crate::policy::RecordPolicy;
use crate::selector::is_valid_label_name;

/// Default query window when a query has no start, in seconds.
pub const DEFAULT_LOOKBACK_SECS: u64 = 60 * 60;

/// Configuration for a [`RemoteHistorian`](crate::historian::RemoteHistorian).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorianConfig {
    /// Labels added to every stream. Rule identity labels take precedence.
    pub external_labels: BTreeMap<String, String>,
    /// How far back a query without a start reaches, in seconds.
    pub default_lookback_secs: u64,
    /// Which transitions are recorded.
    pub policy: RecordPolicy,
}

impl Default for HistorianConfig {
    fn default() -> Self {
        Self {
            external_labels: BTreeMap::new(),
            default_lookback_secs: DEFAULT_LOOKBACK_SECS,
            policy: RecordPolicy::default(),
        }
    }
}

impl HistorianConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HistoryError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the configuration fails validation.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| HistoryError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an external label key is not a valid label name
    /// or the lookback is zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = self.external_labels.keys().find(|k| !is_valid_label_name(k)) {
            return Err(HistoryError::Config(format!(
                "external label '{key}' is not a valid label name"
            )));
        }

        if self.default_lookback_secs == 0 {
            return Err(HistoryError::Config(
                "default_lookback_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Adds a static label.
    #[must_use]
    pub fn with_external_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_labels.insert(key.into(), value.into());
        self
    }

    /// Sets the recording policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RecordPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The default query window.
    #[must_use]
    pub const fn default_lookback(&self) -> Duration {
        Duration::from_secs(self.default_lookback_secs)
    }
}
