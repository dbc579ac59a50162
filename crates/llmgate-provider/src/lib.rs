//! Provider strategies for llmgate.
//!
//! A strategy adapts one upstream provider's request/response shapes to the
//! proxy pipeline: route extraction, prompt/response text extraction, and
//! system-prompt injection/capture. Strategy selection is the router's job;
//! this crate only implements the per-provider capability set.

pub mod gemini;
pub mod strategy;
pub mod system_prompt;

pub use gemini::GeminiStrategy;
pub use strategy::{
    InboundRequest, ModelStreamInfo, PromptStore, ProviderStrategy, StrategyError, StrategyResult,
};
pub use system_prompt::{PromptMode, SystemPromptConfig};
