use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use llmgate_common::{ConfigError, Headers, UpstreamConfig, header_set};
use llmgate_protocol::sse::{SseDecoder, StreamEvent};

use crate::error::UpstreamError;
use crate::retry::{RetryPolicy, StatusClass, classify_status};
use crate::transport::{HttpMethod, HttpTransport, UpstreamBody, UpstreamRequest, UpstreamResponse};

/// Decoded stream payloads; the channel closes on the terminal sentinel or
/// transport end.
pub type EventStream = mpsc::Receiver<Value>;

pub const RESPONSES_ENDPOINT: &str = "/responses";
pub const MODELS_ENDPOINT: &str = "/models";

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Upstream API client with bounded exponential-backoff retry.
///
/// Configuration is immutable after construction; each call allocates its
/// own attempt counter and decoder, so one instance serves overlapping
/// calls without locks.
pub struct ResilientApiClient {
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    transport: Arc<dyn HttpTransport>,
}

impl ResilientApiClient {
    pub fn new(
        config: UpstreamConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        if config.api_key.is_empty() {
            return Err(ConfigError::MissingField("api_key"));
        }
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.base_delay_ms),
            },
            transport,
        })
    }

    /// POST `body` to `endpoint` and decode the JSON response.
    pub async fn unary_call(&self, endpoint: &str, body: &Value) -> Result<Value, UpstreamError> {
        let response = self.send_with_retry(endpoint, body, false).await?;
        decode_json_body(response.body).await
    }

    /// POST `body` with the stream flag forced on; the response bytes are
    /// decoded incrementally into a lazy event sequence.
    pub async fn stream_call(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<EventStream, UpstreamError> {
        let mut body = body.clone();
        if let Some(map) = body.as_object_mut() {
            map.insert("stream".to_string(), Value::Bool(true));
        }
        let response = self.send_with_retry(endpoint, &body, true).await?;
        Ok(spawn_event_decoder(response.body))
    }

    /// GET the models listing. Failures are terminal; no retry.
    pub async fn list_models(&self) -> Result<Value, UpstreamError> {
        let url = format!("{}{}", self.base_url, MODELS_ENDPOINT);
        let request = UpstreamRequest {
            method: HttpMethod::Get,
            url: url.clone(),
            headers: self.headers(false),
            body: None,
            is_stream: false,
        };
        info!(event = "upstream_request", method = "GET", url = %url);
        let response = self.transport.send(request).await?;
        let status = response.status;
        if !matches!(classify_status(status), StatusClass::Success) {
            let body = collect_body(response.body).await;
            warn!(event = "upstream_response", url = %url, status = status, "models listing failed");
            return Err(UpstreamError::Http { status, body });
        }
        decode_json_body(response.body).await
    }

    pub async fn generate(&self, body: &Value) -> Result<Value, UpstreamError> {
        self.unary_call(RESPONSES_ENDPOINT, body).await
    }

    pub async fn generate_stream(&self, body: &Value) -> Result<EventStream, UpstreamError> {
        self.stream_call(RESPONSES_ENDPOINT, body).await
    }

    fn headers(&self, with_body: bool) -> Headers {
        let mut headers = Vec::new();
        header_set(
            &mut headers,
            "Authorization",
            format!("Bearer {}", self.api_key),
        );
        header_set(&mut headers, "Accept", "application/json");
        if with_body {
            header_set(&mut headers, "Content-Type", "application/json");
        }
        headers
    }

    /// Attempt loop shared by unary and streaming calls: 429/5xx retry
    /// with backoff while budget remains, 401/403 and any other non-2xx
    /// are terminal immediately. A streaming retry happens strictly before
    /// any success bytes were delivered, so output never splices across
    /// attempts.
    async fn send_with_retry(
        &self,
        endpoint: &str,
        body: &Value,
        is_stream: bool,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let payload = Bytes::from(
            serde_json::to_vec(body).map_err(|err| UpstreamError::Decode(err.to_string()))?,
        );

        let mut attempt: u32 = 0;
        loop {
            let request = UpstreamRequest {
                method: HttpMethod::Post,
                url: url.clone(),
                headers: self.headers(true),
                body: Some(payload.clone()),
                is_stream,
            };
            info!(
                event = "upstream_request",
                method = "POST",
                url = %url,
                attempt = attempt,
                is_stream = is_stream
            );
            let response = self.transport.send(request).await.inspect_err(|err| {
                warn!(event = "upstream_response", url = %url, status = "error", error = %err);
            })?;

            let status = response.status;
            match classify_status(status) {
                StatusClass::Success => {
                    info!(event = "upstream_response", url = %url, status = status, attempt = attempt);
                    return Ok(response);
                }
                StatusClass::Retryable if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        event = "upstream_retry",
                        url = %url,
                        status = status,
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                StatusClass::Auth | StatusClass::Retryable | StatusClass::Terminal => {
                    let body = collect_body(response.body).await;
                    warn!(
                        event = "upstream_response",
                        url = %url,
                        status = status,
                        "terminal upstream failure"
                    );
                    return Err(UpstreamError::Http { status, body });
                }
            }
        }
    }
}

async fn collect_body(body: UpstreamBody) -> Bytes {
    match body {
        UpstreamBody::Bytes(bytes) => bytes,
        UpstreamBody::Stream(mut chunks) => {
            let mut buf = Vec::new();
            while let Some(chunk) = chunks.recv().await {
                buf.extend_from_slice(&chunk);
            }
            Bytes::from(buf)
        }
    }
}

async fn decode_json_body(body: UpstreamBody) -> Result<Value, UpstreamError> {
    let bytes = collect_body(body).await;
    serde_json::from_slice(&bytes).map_err(|err| UpstreamError::Decode(err.to_string()))
}

/// Decode response bytes into events on a task; a fresh decoder per call,
/// nothing shared across calls. The pump stops on the sentinel, on
/// transport end, and when the receiver is dropped.
fn spawn_event_decoder(body: UpstreamBody) -> EventStream {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut decoder = SseDecoder::new();
        match body {
            UpstreamBody::Stream(mut chunks) => {
                while let Some(chunk) = chunks.recv().await {
                    if forward_events(&tx, decoder.push_bytes(&chunk)).await {
                        return;
                    }
                }
                forward_events(&tx, decoder.finish()).await;
            }
            UpstreamBody::Bytes(bytes) => {
                // A transport may deliver a short stream as one buffered body.
                if forward_events(&tx, decoder.push_bytes(&bytes)).await {
                    return;
                }
                forward_events(&tx, decoder.finish()).await;
            }
        }
    });
    rx
}

/// Returns true when the sequence is over: terminal sentinel seen or the
/// receiver has been dropped.
async fn forward_events(tx: &mpsc::Sender<Value>, events: Vec<StreamEvent>) -> bool {
    for event in events {
        match event {
            StreamEvent::Data(value) => {
                if tx.send(value).await.is_err() {
                    return true;
                }
            }
            StreamEvent::Skipped(payload) => {
                warn!(
                    event = "stream_decode",
                    payload = %payload,
                    "skipping malformed stream payload"
                );
            }
            StreamEvent::Done => return true,
        }
    }
    false
}
