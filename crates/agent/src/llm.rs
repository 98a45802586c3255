use anyhow::Result;
use async_trait::async_trait;
use miled_core::Message;

use crate::router::ModelTier;

/// Everything a model provider needs for one completion.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    /// System message first, current user message last.
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub tier: ModelTier,
    pub model: String,
    pub thinking_budget: i32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Text of the first completion. An empty string counts as no usable text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
