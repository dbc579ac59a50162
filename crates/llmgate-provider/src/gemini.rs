use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::strategy::{
    InboundRequest, ModelStreamInfo, PromptStore, ProviderStrategy, StrategyError, StrategyResult,
};
use crate::system_prompt::{
    PromptMode, SystemPromptConfig, system_instruction_text, write_system_instruction,
};

const PROVIDER_NAME: &str = "gemini";
const ROUTE_PREFIX: &str = "/v1beta/models/";
const GENERATE_ACTION: &str = ":generateContent";
const STREAM_GENERATE_ACTION: &str = ":streamGenerateContent";

/// Strategy for the Gemini generateContent API surface.
pub struct GeminiStrategy {
    prompt_store: Arc<dyn PromptStore>,
}

impl GeminiStrategy {
    pub fn new(prompt_store: Arc<dyn PromptStore>) -> Self {
        Self { prompt_store }
    }
}

/// Split `/v1beta/models/{model}:{action}` into routing info.
///
/// The model segment is passed through verbatim, reserved characters and
/// all; it is never percent-decoded.
fn parse_route(path: &str) -> Option<ModelStreamInfo> {
    let rest = path.strip_prefix(ROUTE_PREFIX)?;
    let (model, is_stream) = if let Some(model) = rest.strip_suffix(STREAM_GENERATE_ACTION) {
        (model, true)
    } else if let Some(model) = rest.strip_suffix(GENERATE_ACTION) {
        (model, false)
    } else {
        return None;
    };
    if model.is_empty() {
        return None;
    }
    Some(ModelStreamInfo {
        model: model.to_string(),
        is_stream,
    })
}

/// Document-order concatenation of `parts[].text`, no separator.
fn parts_text(parts: &Value) -> String {
    parts
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ProviderStrategy for GeminiStrategy {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn extract_model_and_stream_info(
        &self,
        request: &InboundRequest,
    ) -> StrategyResult<ModelStreamInfo> {
        parse_route(&request.path).ok_or_else(|| StrategyError::RouteMismatch {
            path: request.path.clone(),
        })
    }

    fn extract_response_text(&self, response: &Value) -> String {
        response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .map(parts_text)
            .unwrap_or_default()
    }

    fn extract_prompt_text(&self, request_body: &Value) -> String {
        request_body
            .get("contents")
            .and_then(Value::as_array)
            .and_then(|contents| contents.last())
            .and_then(|content| content.get("parts"))
            .map(parts_text)
            .unwrap_or_default()
    }

    fn apply_system_prompt(&self, config: &SystemPromptConfig, mut body: Value) -> Value {
        let Some(file_path) = config.file_path.as_deref() else {
            return body;
        };
        // Configured but never loaded is distinct from loaded-but-empty;
        // only the former leaves the request untouched.
        let Some(content) = config.content.as_deref() else {
            return body;
        };

        let existing = system_instruction_text(&body);
        let new_text = if config.mode == PromptMode::Append && !existing.is_empty() {
            format!("{existing}\n{content}")
        } else {
            content.to_string()
        };
        write_system_instruction(&mut body, new_text);
        info!(
            provider = PROVIDER_NAME,
            file = %file_path,
            mode = ?config.mode,
            "applied system prompt from file"
        );
        body
    }

    async fn manage_system_prompt(&self, request_body: &Value) {
        let text = system_instruction_text(request_body);
        self.prompt_store.persist(PROVIDER_NAME, &text).await;
    }
}
