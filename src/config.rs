use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Tuning for fix classification and persistence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// A fix later than this after the last major fix is major (default: 10)
    #[serde(default = "default_time_threshold")]
    pub time_threshold_secs: f64,

    /// A fix further than this from the last major fix is major (default: 1)
    #[serde(default = "default_dist_threshold")]
    pub dist_threshold_meters: f64,

    /// Quiet period after a change before the log is written (default: 2000)
    #[serde(default = "default_debounce_ms")]
    pub autosave_debounce_ms: u64,

    /// Extra attempts after a failed write (default: 3)
    #[serde(default = "default_save_retries")]
    pub save_retries: u32,

    /// Delay before the first retry, doubled on each further attempt (default: 500)
    #[serde(default = "default_retry_backoff_ms")]
    pub save_retry_backoff_ms: u64,

    /// Persisted files are named `{prefix}-{generation}.gpx` (default: "persist")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            time_threshold_secs: default_time_threshold(),
            dist_threshold_meters: default_dist_threshold(),
            autosave_debounce_ms: default_debounce_ms(),
            save_retries: default_save_retries(),
            save_retry_backoff_ms: default_retry_backoff_ms(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl TrackerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.save_retry_backoff_ms)
    }
}

fn default_time_threshold() -> f64 {
    10.0
}

fn default_dist_threshold() -> f64 {
    1.0
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_save_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_file_prefix() -> String {
    "persist".to_string()
}
