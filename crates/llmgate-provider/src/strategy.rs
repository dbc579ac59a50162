use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use llmgate_common::Headers;

use crate::system_prompt::SystemPromptConfig;

/// Inbound HTTP request surface a strategy is allowed to inspect.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub path: String,
    pub host: String,
    pub headers: Headers,
    pub body: Value,
}

/// Routing info extracted from one inbound request; never mutated after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStreamInfo {
    pub model: String,
    pub is_stream: bool,
}

pub type StrategyResult<T> = Result<T, StrategyError>;

#[derive(Debug, Clone)]
pub enum StrategyError {
    RouteMismatch { path: String },
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyError::RouteMismatch { path } => {
                write!(f, "path {path:?} does not match the provider route pattern")
            }
        }
    }
}

impl Error for StrategyError {}

/// Per-provider adaptation capability set.
///
/// One concrete type per upstream provider; an external dispatcher selects
/// which strategy handles a given path. Implementations hold no mutable
/// state and are safe to share across concurrent requests.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Routing info for an inbound request. Fails fast when the path does
    /// not match this provider's route pattern; no partial result.
    fn extract_model_and_stream_info(
        &self,
        request: &InboundRequest,
    ) -> StrategyResult<ModelStreamInfo>;

    /// Concatenated text of the first response candidate; empty string when
    /// the structure is absent or empty.
    fn extract_response_text(&self, response: &Value) -> String;

    /// Concatenated text of the last request content; empty string when the
    /// structure is absent or empty.
    fn extract_prompt_text(&self, request_body: &Value) -> String;

    /// Inject configured prompt-file content into the request body.
    fn apply_system_prompt(&self, config: &SystemPromptConfig, body: Value) -> Value;

    /// Capture the request's current system instruction into the prompt
    /// store; pure side effect.
    async fn manage_system_prompt(&self, request_body: &Value);
}

/// Sink for captured system prompts, keyed by provider identity.
///
/// Persistence lives outside this crate; strategies only forward text.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn persist(&self, provider: &str, text: &str);
}
