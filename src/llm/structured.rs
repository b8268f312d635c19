//! Schema-constrained replies
//!
//! The backend is asked to answer with JSON matching a schema, and the reply
//! is decoded straight into a typed value.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::{Message, NetpilotError, Result};
use crate::llm::traits::{GenerateOptions, LLMProvider};

/// A reply type with the JSON schema the backend must follow
pub trait Structured: DeserializeOwned {
    fn schema() -> Value;
}

/// Ask `model` for a reply shaped like `T`
///
/// No tools are offered. A reply that does not decode into `T` is a backend
/// error.
pub async fn generate_structured<T: Structured>(
    llm: &dyn LLMProvider,
    model: &str,
    messages: &[Message],
    options: GenerateOptions,
) -> Result<T> {
    let options = GenerateOptions {
        format: Some(T::schema()),
        ..options
    };
    let response = llm.chat_with_tools(model, messages, &[], Some(options)).await?;
    serde_json::from_str(response.content.trim()).map_err(|e| {
        NetpilotError::backend(format!("reply does not match the requested schema: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolDefinition;
    use crate::llm::LLMResponse;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Uptime {
        days: u32,
    }

    impl Structured for Uptime {
        fn schema() -> Value {
            json!({"type": "object", "properties": {"days": {"type": "integer"}}, "required": ["days"]})
        }
    }

    /// Replies with fixed text and remembers the format it was asked for
    struct Fixed {
        reply: &'static str,
        format: Mutex<Option<Value>>,
    }

    #[async_trait]
    impl LLMProvider for Fixed {
        async fn chat_with_tools(
            &self,
            _model: &str,
            _messages: &[Message],
            tools: &[ToolDefinition],
            options: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            assert!(tools.is_empty());
            *self.format.lock().unwrap() = options.and_then(|o| o.format);
            Ok(LLMResponse::text(self.reply))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_reply_decodes_and_schema_is_sent() {
        let llm = Fixed {
            reply: " {\"days\": 12}\n",
            format: Mutex::new(None),
        };
        let messages = [Message::user("uptime is 12 days")];
        let uptime: Uptime = generate_structured(&llm, "m", &messages, GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(uptime, Uptime { days: 12 });
        assert_eq!(*llm.format.lock().unwrap(), Some(Uptime::schema()));
    }

    #[tokio::test]
    async fn test_off_schema_reply_is_backend_error() {
        let llm = Fixed {
            reply: "The router has been up for 12 days.",
            format: Mutex::new(None),
        };
        let err = generate_structured::<Uptime>(&llm, "m", &[], GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetpilotError::ModelBackend(_)));
    }
}
