//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netpilot::agent::AgentSettings;
use netpilot::core::{Message, NetpilotError, Result, ToolDefinition};
use netpilot::llm::{GenerateOptions, LLMProvider, LLMResponse};

/// Replays canned responses and records every prompt it was sent
pub struct ScriptedModel {
    responses: Mutex<VecDeque<LLMResponse>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    latency: Duration,
}

impl ScriptedModel {
    pub fn new(responses: Vec<LLMResponse>) -> Arc<Self> {
        Self::with_latency(responses, Duration::ZERO)
    }

    /// Like `new`, but every call takes `latency` to answer
    pub fn with_latency(responses: Vec<LLMResponse>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            latency,
        })
    }

    /// Same text response, `n` times
    pub fn repeating(text: &str, n: usize) -> Arc<Self> {
        Self::new((0..n).map(|_| LLMResponse::text(text)).collect())
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Messages of the `i`-th model call
    pub fn prompt(&self, i: usize) -> Vec<Message> {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedModel {
    async fn chat_with_tools(
        &self,
        _model: &str,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NetpilotError::backend("script exhausted"))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["scripted".into()])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn settings(max_steps: usize) -> AgentSettings {
    AgentSettings {
        model: "scripted".into(),
        max_steps,
        model_retries: 0,
        retry_backoff: Duration::from_millis(1),
        temperature: 0.0,
        num_ctx: None,
        system_prompt: None,
    }
}
