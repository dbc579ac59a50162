//! Resilient upstream IO for llmgate.
//!
//! The client issues unary and streaming calls through an [`HttpTransport`]
//! seam with a bounded exponential-backoff retry loop on top. Streaming
//! responses are decoded incrementally by `llmgate-protocol` and delivered
//! as a lazy event sequence.

pub mod client;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::{EventStream, MODELS_ENDPOINT, RESPONSES_ENDPOINT, ResilientApiClient};
pub use error::{ErrorKind, UpstreamError};
pub use retry::{RetryPolicy, StatusClass, classify_status};
pub use transport::{
    ByteStream, HttpMethod, HttpTransport, TransportConfig, UpstreamBody, UpstreamRequest,
    UpstreamResponse, WreqTransport,
};
