//! Configuration types for upload-batch

use crate::error::{Error, Result};
use crate::upload::ValidationRules;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
///
/// Every section has sensible defaults, so `Config::default()` (or `{}` in JSON)
/// is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Batch execution settings (concurrency, retries, backoff)
    #[serde(default)]
    pub batch: BatchConfig,

    /// Upload client settings (endpoint, timeout, file validation)
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Check every section, returning the first invalid setting
    pub fn validate(&self) -> Result<()> {
        self.batch.validate()?;
        self.upload.validate()
    }
}

/// Batch execution configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of concurrent workers (default: 5)
    ///
    /// Clamped to the number of tasks at run time; values below 1 are rejected.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per task, including the first one (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff between attempts
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry: RetryConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Reject settings that would make a batch impossible to schedule
    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(Error::config(
                format!("concurrency must be at least 1, got {}", self.concurrency),
                "batch.concurrency",
            ));
        }
        if self.max_retries < 1 {
            return Err(Error::config(
                "max_retries must be at least 1 (it counts the first attempt)",
                "batch.max_retries",
            ));
        }
        self.retry.validate()
    }
}

/// Linear backoff configuration
///
/// The delay after failed attempt `n` is `base_delay * n` (1s, 2s, 3s, ... by default),
/// optionally capped at `max_delay` and stretched by jitter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay unit for linear backoff (default: 1 second)
    #[serde(default = "default_base_delay", with = "duration_millis")]
    pub base_delay: Duration,

    /// Upper bound for any single delay (default: none)
    #[serde(default, with = "optional_duration_millis")]
    pub max_delay: Option<Duration>,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: None,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Configuration with no delay between attempts, handy for tests and local work
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_delay
            && max < self.base_delay
        {
            return Err(Error::config(
                format!(
                    "max_delay ({}ms) is shorter than base_delay ({}ms)",
                    max.as_millis(),
                    self.base_delay.as_millis()
                ),
                "batch.retry.max_delay",
            ));
        }
        Ok(())
    }
}

/// Upload client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the upload service; files are posted to `{endpoint}/upload`
    /// (default: "http://127.0.0.1:8787/")
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_millis")]
    pub timeout: Duration,

    /// Rules applied to every file before it is scheduled
    #[serde(default)]
    pub validation: ValidationRules,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_upload_timeout(),
            validation: ValidationRules::default(),
        }
    }
}

impl UploadConfig {
    /// Parse the endpoint and append the `upload` path segment
    pub fn upload_url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint).map_err(|e| {
            Error::config(
                format!("invalid endpoint {:?}: {}", self.endpoint, e),
                "upload.endpoint",
            )
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                Error::config(
                    format!("endpoint {:?} cannot carry a path", self.endpoint),
                    "upload.endpoint",
                )
            })?
            .pop_if_empty()
            .push("upload");
        Ok(url)
    }

    fn validate(&self) -> Result<()> {
        self.upload_url()?;
        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be non-zero", "upload.timeout"));
        }
        Ok(())
    }
}

// Default value functions
fn default_concurrency() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8787/".to_string()
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper (milliseconds)
mod optional_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
