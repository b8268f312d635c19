//! Model backend seam
//!
//! The agent loop only ever sees `LLMProvider`; Ollama is one implementation
//! and tests plug in scripted ones.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{Message, Result, ToolCall, ToolDefinition};

/// One model turn
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// Free text (thoughts, code blocks, final answer markers)
    pub content: String,
    /// Native tool calls, in the order the model emitted them
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
    /// Model that answered, as reported by the backend
    pub model: String,
    /// Generation stopped on the token limit rather than naturally
    pub truncated: bool,
}

impl LLMResponse {
    /// Plain text response with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Response carrying a single native tool call
    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            tool_calls: vec![call],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Sampling knobs passed through to the backend
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    /// Context window size
    pub num_ctx: Option<u32>,
    /// Generation halts before any of these strings
    pub stop: Vec<String>,
    /// JSON schema the reply must follow
    pub format: Option<Value>,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send the conversation and the tool catalogue, get one turn back
    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse>;

    /// Whether `model` is installed; a bare name matches any tag of it
    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| same_model(m, model)))
    }

    async fn list_models(&self) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}

fn same_model(installed: &str, wanted: &str) -> bool {
    if installed == wanted {
        return true;
    }
    match wanted.split_once(':') {
        // an explicit tag must match exactly
        Some(_) => false,
        None => installed.split(':').next() == Some(wanted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_model_tags() {
        assert!(same_model("qwen2.5:latest", "qwen2.5"));
        assert!(same_model("qwen2.5:7b", "qwen2.5:7b"));
        assert!(!same_model("qwen2.5:7b", "qwen2.5:14b"));
        assert!(!same_model("qwen2.5-coder:7b", "qwen2.5"));
    }
}
