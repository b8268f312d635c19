//! Ollama backend
//!
//! Talks to `/api/chat` (non-streaming, with the tool catalogue) and
//! `/api/tags`.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::core::{Config, Message, NetpilotError, Result, ToolCall, ToolDefinition};
use crate::llm::traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<WireOptions>,
    /// Schema-constrained output
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct WireOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: WireMessage,
    model: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.ollama.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.ollama_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn wire_message(msg: &Message) -> WireMessage {
        let tool_calls = msg
            .tool_calls
            .iter()
            .flatten()
            .map(|call| WireToolCall {
                function: WireFunction {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect();
        WireMessage {
            role: msg.role.clone(),
            content: msg.content.clone(),
            tool_calls,
        }
    }

    fn chat_request<'a>(
        model: &'a str,
        messages: &[Message],
        tools: &'a [ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> ChatRequest<'a> {
        let (options, format) = match options {
            Some(opts) => (
                Some(WireOptions {
                    temperature: opts.temperature,
                    num_ctx: opts.num_ctx,
                    stop: opts.stop,
                }),
                opts.format,
            ),
            None => (None, None),
        };
        ChatRequest {
            model,
            messages: messages.iter().map(Self::wire_message).collect(),
            tools: (!tools.is_empty()).then_some(tools),
            options,
            format,
            stream: false,
        }
    }

    fn into_response(response: ChatResponse) -> LLMResponse {
        let tool_calls = response
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall::new(tc.function.name, normalize_arguments(tc.function.arguments)))
            .collect();

        let usage = match (response.prompt_eval_count, response.eval_count) {
            (Some(prompt_tokens), Some(completion_tokens)) => Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
            }),
            _ => None,
        };

        LLMResponse {
            content: response.message.content,
            tool_calls,
            usage,
            model: response.model,
            truncated: response.done_reason.as_deref() == Some("length"),
        }
    }

    fn unreachable(&self, e: reqwest::Error) -> NetpilotError {
        if e.is_connect() || e.is_timeout() {
            NetpilotError::backend(format!("Cannot reach Ollama at {}: {}", self.base_url, e))
        } else {
            NetpilotError::from(e)
        }
    }

    /// Turn a non-2xx reply into an error; 404 on a model means it is not pulled
    async fn check_status(&self, response: Response, model: Option<&str>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if let (404, Some(model)) = (status.as_u16(), model) {
            if body.contains("not found") {
                return Err(NetpilotError::ModelNotFound(model.to_string()));
            }
        }
        Err(NetpilotError::backend(format!("Ollama API error ({}): {}", status, body)))
    }
}

/// Some models send arguments as a JSON-encoded string, or omit them
fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Null => Value::Object(Default::default()),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::String(raw),
        },
        other => other,
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let request = Self::chat_request(model, messages, tools, options);

        tracing::trace!(
            request = %serde_json::to_string(&request)?,
            "ollama chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let response = self.check_status(response, Some(model)).await?;

        let body = response.text().await.map_err(|e| self.unreachable(e))?;
        tracing::trace!(response = %body, "ollama chat response");

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| NetpilotError::backend(format!("Malformed Ollama reply: {}", e)))?;
        Ok(Self::into_response(parsed))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let tags: TagsResponse = self.check_status(response, None).await?.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let mut config = Config::default();
        config.ollama.host = "10.1.1.5".to_string();
        config.ollama.port = 11434;
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://10.1.1.5:11434");
    }

    #[test]
    fn test_message_conversion() {
        let wire = OllamaClient::wire_message(&Message::user("Hello"));
        assert_eq!(wire.role, "user");
        assert_eq!(wire.content, "Hello");
        let encoded = serde_json::to_value(&wire).unwrap();
        assert!(encoded.get("tool_calls").is_none());
    }

    #[test]
    fn test_response_with_tool_calls() {
        let raw = r#"{
            "model": "qwen2.5",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "send_ping_from_agent", "arguments": {"ip_address": "10.0.0.1"}}},
                    {"function": {"name": "show_ip_route", "arguments": "{\"host\": \"r1\"}"}}
                ]
            },
            "done_reason": "stop",
            "prompt_eval_count": 10,
            "eval_count": 5
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let response = OllamaClient::into_response(parsed);
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].name, "send_ping_from_agent");
        assert_eq!(response.tool_calls[1].arguments, json!({"host": "r1"}));
        assert_eq!(response.usage.unwrap().total(), 15);
        assert!(!response.truncated);
    }

    #[test]
    fn test_truncated_reply() {
        let raw = r#"{"model": "qwen2.5", "message": {"role": "assistant", "content": "```py\nfor"}, "done_reason": "length"}"#;
        let response = OllamaClient::into_response(serde_json::from_str(raw).unwrap());
        assert!(response.truncated);
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_format_is_a_top_level_field() {
        let schema = json!({"type": "object", "properties": {"ios_version": {"type": "string"}}});
        let options = GenerateOptions {
            temperature: Some(0.0),
            format: Some(schema.clone()),
            ..Default::default()
        };
        let messages = [Message::user("show version output")];
        let request = OllamaClient::chat_request("llama3.1", &messages, &[], Some(options));
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["format"], schema);
        assert_eq!(body["options"]["temperature"], json!(0.0));
        assert!(body.get("tools").is_none());

        let plain = serde_json::to_value(OllamaClient::chat_request("llama3.1", &messages, &[], None)).unwrap();
        assert!(plain.get("format").is_none());
    }

    #[test]
    fn test_normalize_arguments() {
        assert_eq!(normalize_arguments(Value::Null), json!({}));
        assert_eq!(normalize_arguments(json!("not json")), json!("not json"));
        assert_eq!(normalize_arguments(json!({"a": 1})), json!({"a": 1}));
    }
}
