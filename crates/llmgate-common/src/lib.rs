pub mod config;
pub mod headers;

pub use config::{
    ConfigError, DEFAULT_BASE_DELAY_MS, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, UpstreamConfig,
    UpstreamConfigPatch,
};
pub use headers::{Headers, header_get, header_set};
