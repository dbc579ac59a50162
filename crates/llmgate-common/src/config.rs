use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required upstream config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged upstream configuration used by one API client.
///
/// Merge order: CLI > ENV > defaults; merging happens in the outer layer
/// via [`UpstreamConfigPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Bearer token sent on every upstream request.
    pub api_key: String,
    pub base_url: String,
    /// Retry budget for 429/5xx responses; total attempts are max_retries + 1.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
}

/// Optional layer used for merging upstream config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamConfigPatch {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

impl UpstreamConfigPatch {
    pub fn overlay(&mut self, other: UpstreamConfigPatch) {
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.base_delay_ms.is_some() {
            self.base_delay_ms = other.base_delay_ms;
        }
    }

    pub fn into_config(self) -> Result<UpstreamConfig, ConfigError> {
        Ok(UpstreamConfig {
            api_key: self.api_key.ok_or(ConfigError::MissingField("api_key"))?,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            base_delay_ms: self.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS),
        })
    }
}

impl From<UpstreamConfig> for UpstreamConfigPatch {
    fn from(value: UpstreamConfig) -> Self {
        Self {
            api_key: Some(value.api_key),
            base_url: Some(value.base_url),
            max_retries: Some(value.max_retries),
            base_delay_ms: Some(value.base_delay_ms),
        }
    }
}
