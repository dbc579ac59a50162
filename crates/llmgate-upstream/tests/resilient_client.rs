use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use llmgate_common::{ConfigError, UpstreamConfig, header_get};
use llmgate_upstream::{
    ErrorKind, HttpMethod, HttpTransport, ResilientApiClient, UpstreamBody, UpstreamError,
    UpstreamRequest, UpstreamResponse,
};

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<UpstreamResponse, UpstreamError>>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<Result<UpstreamResponse, UpstreamError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> UpstreamRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(req);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport script exhausted")
        })
    }
}

fn http(status: u16, body: &str) -> Result<UpstreamResponse, UpstreamError> {
    Ok(UpstreamResponse {
        status,
        body: UpstreamBody::Bytes(Bytes::copy_from_slice(body.as_bytes())),
    })
}

fn streaming(status: u16, chunks: &[&str]) -> Result<UpstreamResponse, UpstreamError> {
    let (tx, rx) = mpsc::channel(chunks.len().max(1));
    for chunk in chunks {
        tx.try_send(Bytes::copy_from_slice(chunk.as_bytes()))
            .unwrap();
    }
    Ok(UpstreamResponse {
        status,
        body: UpstreamBody::Stream(rx),
    })
}

fn config(max_retries: u32, base_delay_ms: u64) -> UpstreamConfig {
    UpstreamConfig {
        api_key: "test-key".to_string(),
        base_url: "https://upstream.test/v1".to_string(),
        max_retries,
        base_delay_ms,
    }
}

fn client(transport: Arc<ScriptedTransport>, max_retries: u32) -> ResilientApiClient {
    ResilientApiClient::new(config(max_retries, 1000), transport).unwrap()
}

async fn collect(mut stream: llmgate_upstream::EventStream) -> Vec<Value> {
    let mut items = Vec::new();
    while let Some(item) = stream.recv().await {
        items.push(item);
    }
    items
}

#[test]
fn construction_requires_api_key() {
    let transport = ScriptedTransport::new(Vec::new());
    let mut cfg = config(3, 1000);
    cfg.api_key = String::new();
    let err = ResilientApiClient::new(cfg, transport).unwrap_err();
    assert!(matches!(err, ConfigError::MissingField("api_key")));
}

#[tokio::test(start_paused = true)]
async fn retries_with_exponential_backoff_until_success() {
    let transport = ScriptedTransport::new(vec![
        http(429, "slow down"),
        http(429, "slow down"),
        http(429, "slow down"),
        http(200, "{\"ok\":true}"),
    ]);
    let client = client(transport.clone(), 3);

    let started = tokio::time::Instant::now();
    let value = client.unary_call("/responses", &json!({})).await.unwrap();
    assert_eq!(value, json!({"ok": true}));
    assert_eq!(transport.attempts(), 4);
    // 1000 + 2000 + 4000 ms of backoff, nothing else.
    assert_eq!(started.elapsed(), Duration::from_millis(7000));
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_is_terminal() {
    let transport = ScriptedTransport::new(vec![
        http(429, "slow down"),
        http(429, "slow down"),
        http(429, "over budget"),
    ]);
    let client = client(transport.clone(), 2);

    let err = client.unary_call("/responses", &json!({})).await.unwrap_err();
    assert_eq!(transport.attempts(), 3);
    assert_eq!(err.kind(), ErrorKind::RateLimit);
    match err {
        UpstreamError::Http { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, Bytes::from_static(b"over budget"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn server_errors_retry_like_rate_limits() {
    let transport = ScriptedTransport::new(vec![http(503, "downstream"), http(200, "{}")]);
    let client = client(transport.clone(), 3);

    client.unary_call("/responses", &json!({})).await.unwrap();
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_is_immediately_terminal() {
    let transport = ScriptedTransport::new(vec![http(401, "bad key")]);
    let client = client(transport.clone(), 3);

    let started = tokio::time::Instant::now();
    let err = client.unary_call("/responses", &json!({})).await.unwrap_err();
    assert_eq!(transport.attempts(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn other_client_errors_do_not_retry() {
    let transport = ScriptedTransport::new(vec![http(404, "no such route")]);
    let client = client(transport.clone(), 3);

    let err = client.unary_call("/responses", &json!({})).await.unwrap_err();
    assert_eq!(transport.attempts(), 1);
    assert_eq!(err.kind(), ErrorKind::UpstreamClient);
    match err {
        UpstreamError::Http { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, Bytes::from_static(b"no such route"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn transport_failures_do_not_retry() {
    let transport = ScriptedTransport::new(vec![Err(UpstreamError::Transport(
        "connection refused".to_string(),
    ))]);
    let client = client(transport.clone(), 3);

    let err = client.unary_call("/responses", &json!({})).await.unwrap_err();
    assert_eq!(transport.attempts(), 1);
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn unary_call_sends_bearer_auth_and_json_body() {
    let transport = ScriptedTransport::new(vec![http(200, "{}")]);
    let client = client(transport.clone(), 3);

    client
        .unary_call("/responses", &json!({"input": "hi"}))
        .await
        .unwrap();

    let request = transport.request(0);
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, "https://upstream.test/v1/responses");
    assert_eq!(
        header_get(&request.headers, "authorization"),
        Some("Bearer test-key")
    );
    assert_eq!(
        header_get(&request.headers, "content-type"),
        Some("application/json")
    );
    let body: Value = serde_json::from_slice(&request.body.unwrap()).unwrap();
    assert_eq!(body, json!({"input": "hi"}));
}

#[tokio::test]
async fn undecodable_success_body_is_an_error() {
    let transport = ScriptedTransport::new(vec![http(200, "not-json")]);
    let client = client(transport.clone(), 3);

    let err = client.unary_call("/responses", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[tokio::test]
async fn stream_call_forces_stream_flag() {
    let transport =
        ScriptedTransport::new(vec![streaming(200, &["data: [DONE]\n"])]);
    let client = client(transport.clone(), 3);

    let stream = client
        .stream_call("/responses", &json!({"input": "hi", "stream": false}))
        .await
        .unwrap();
    assert!(collect(stream).await.is_empty());

    let request = transport.request(0);
    assert!(request.is_stream);
    let body: Value = serde_json::from_slice(&request.body.unwrap()).unwrap();
    assert_eq!(body, json!({"input": "hi", "stream": true}));
}

#[tokio::test]
async fn stream_decodes_lines_split_across_chunks() {
    let transport = ScriptedTransport::new(vec![streaming(
        200,
        &["da", "ta: {\"a\":1}\n", "data: [DONE]\n", "data: {\"never\":1}\n"],
    )]);
    let client = client(transport.clone(), 3);

    let stream = client.stream_call("/responses", &json!({})).await.unwrap();
    assert_eq!(collect(stream).await, vec![json!({"a": 1})]);
}

#[tokio::test]
async fn stream_skips_malformed_lines() {
    let transport = ScriptedTransport::new(vec![streaming(
        200,
        &["data: not-json\n", "data: {\"b\":2}\n\n", "data: [DONE]\n"],
    )]);
    let client = client(transport.clone(), 3);

    let stream = client.stream_call("/responses", &json!({})).await.unwrap();
    assert_eq!(collect(stream).await, vec![json!({"b": 2})]);
}

#[tokio::test]
async fn stream_ends_cleanly_when_transport_closes_without_sentinel() {
    let transport = ScriptedTransport::new(vec![streaming(200, &["data: {\"a\":1}\n"])]);
    let client = client(transport.clone(), 3);

    let stream = client.stream_call("/responses", &json!({})).await.unwrap();
    assert_eq!(collect(stream).await, vec![json!({"a": 1})]);
}

#[tokio::test(start_paused = true)]
async fn stream_call_retries_before_any_bytes_flow() {
    let transport = ScriptedTransport::new(vec![
        http(429, "slow down"),
        streaming(200, &["data: {\"a\":1}\n", "data: [DONE]\n"]),
    ]);
    let client = client(transport.clone(), 3);

    let stream = client.stream_call("/responses", &json!({})).await.unwrap();
    assert_eq!(collect(stream).await, vec![json!({"a": 1})]);
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test]
async fn dropping_the_stream_stops_the_decode_pump() {
    let (tx, rx) = mpsc::channel::<Bytes>(1);
    let transport = ScriptedTransport::new(vec![Ok(UpstreamResponse {
        status: 200,
        body: UpstreamBody::Stream(rx),
    })]);
    let client = client(transport.clone(), 3);

    let stream = client.stream_call("/responses", &json!({})).await.unwrap();
    drop(stream);

    tx.send(Bytes::from_static(b"data: {\"a\":1}\n"))
        .await
        .unwrap();
    // Once the pump notices the dropped receiver it drops the byte channel.
    tokio::time::timeout(Duration::from_secs(5), tx.closed())
        .await
        .expect("decode pump kept the byte channel open");
}

#[tokio::test]
async fn list_models_does_not_retry_failures() {
    let transport = ScriptedTransport::new(vec![http(500, "boom")]);
    let client = client(transport.clone(), 3);

    let err = client.list_models().await.unwrap_err();
    assert_eq!(transport.attempts(), 1);
    assert_eq!(err.kind(), ErrorKind::UpstreamServer);

    let request = transport.request(0);
    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(request.url, "https://upstream.test/v1/models");
    assert!(request.body.is_none());
}

#[tokio::test]
async fn list_models_decodes_listing() {
    let transport =
        ScriptedTransport::new(vec![http(200, "{\"data\":[{\"id\":\"m-1\"}]}")]);
    let client = client(transport.clone(), 3);

    let value = client.list_models().await.unwrap();
    assert_eq!(value, json!({"data": [{"id": "m-1"}]}));
}
