//! Interpretation of model responses
//!
//! A response is accepted in one of these shapes, checked in order:
//! a native tool call, a fenced code block (a ```json block holding a call
//! object counts as a tool call), a `Final Answer:` marker, or a bare JSON
//! call object. Anything else is a malformed action.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::{NetpilotError, Result, ToolCall};
use crate::llm::LLMResponse;
use crate::sandbox::value::to_display;

/// Name of the pseudo-tool that ends a run
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("valid fence regex")
});

static FINAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)final\s+answer\s*:\s*(.*)").expect("valid marker regex"));

/// What the model asked for
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAction {
    /// The run is finished with this answer
    FinalAnswer(String),
    /// Invoke a single tool
    Tool(ToolCall),
    /// Run a code block in the sandbox
    Code(String),
}

/// Classify a model response
pub fn parse_response(response: &LLMResponse) -> Result<ParsedAction> {
    if let Some(call) = response.tool_calls.first() {
        if response.tool_calls.len() > 1 {
            tracing::warn!(
                count = response.tool_calls.len(),
                "model returned several tool calls; executing the first"
            );
        }
        return Ok(classify_call(call.clone()));
    }

    let content = response.content.trim();
    if content.is_empty() {
        return Err(NetpilotError::malformed("the model returned an empty response"));
    }

    if let Some(caps) = FENCE.captures(content) {
        let lang = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let body = caps.get(2).map_or("", |m| m.as_str()).trim();
        if let Some(call) = call_from_json(body) {
            return Ok(classify_call(call));
        }
        if lang == "json" {
            return Err(NetpilotError::malformed(
                "the JSON block is not a tool call object with \"name\" and \"arguments\"",
            ));
        }
        if body.is_empty() {
            return Err(NetpilotError::malformed("the code block is empty"));
        }
        return Ok(ParsedAction::Code(body.to_string()));
    }

    if let Some(caps) = FINAL_MARKER.captures(content) {
        let answer = caps.get(1).map_or("", |m| m.as_str()).trim();
        return Ok(ParsedAction::FinalAnswer(answer.to_string()));
    }

    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Some(call) = call_from_json(&content[start..=end]) {
                return Ok(classify_call(call));
            }
        }
    }

    Err(NetpilotError::malformed(
        "expected a tool call, a code block, or 'Final Answer: ...'",
    ))
}

fn classify_call(call: ToolCall) -> ParsedAction {
    if call.name == FINAL_ANSWER_TOOL {
        let answer = match &call.arguments {
            Value::Object(map) => map
                .get("answer")
                .or_else(|| map.values().next())
                .map(to_display)
                .unwrap_or_default(),
            other => to_display(other),
        };
        ParsedAction::FinalAnswer(answer)
    } else {
        ParsedAction::Tool(call)
    }
}

/// Read `{"name": .., "arguments": ..}` or `{"action": .., "action_input": ..}`
fn call_from_json(text: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;
    let name = obj.get("name").or_else(|| obj.get("action"))?.as_str()?;
    let arguments = obj
        .get("arguments")
        .or_else(|| obj.get("action_input"))
        .cloned()
        .unwrap_or(Value::Null);
    // arguments sometimes arrive as a JSON string
    let arguments = match arguments {
        Value::String(s) if name != FINAL_ANSWER_TOOL => {
            serde_json::from_str(&s).unwrap_or(Value::String(s))
        }
        other => other,
    };
    Some(ToolCall::new(name, arguments))
}
