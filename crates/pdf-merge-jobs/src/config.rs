use crate::error::{JobError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and timings for a [`JobStore`](crate::JobStore)
///
/// Durations are written as whole seconds in JSON, e.g.
/// `{"retention_secs": 3600, "max_concurrent_merges": 4}`. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Total bytes a single job may receive across all uploads
    pub max_upload_bytes: u64,

    /// Idle time after which a job is reclaimed
    #[serde(rename = "retention_secs", with = "duration_secs")]
    pub retention: Duration,

    /// How long a downloaded output is kept before it is reclaimed
    #[serde(rename = "download_grace_secs", with = "duration_secs")]
    pub download_grace: Duration,

    #[serde(rename = "sweep_interval_secs", with = "duration_secs")]
    pub sweep_interval: Duration,

    /// Status polling interval recommended to clients
    #[serde(rename = "poll_interval_ms", with = "duration_millis")]
    pub poll_interval: Duration,

    /// Merges allowed to run at once; further merges queue. `None` means unbounded.
    pub max_concurrent_merges: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
            retention: Duration::from_secs(60 * 60),
            download_grace: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(1),
            max_concurrent_merges: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            JobError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| JobError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| JobError::Config(format!("Failed to serialize config: {}", e)))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| JobError::Config(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(JobError::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.retention.is_zero() {
            return Err(JobError::Config(
                "Retention window must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(JobError::Config(
                "Sweep interval must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_merges == Some(0) {
            return Err(JobError::Config(
                "max_concurrent_merges must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
