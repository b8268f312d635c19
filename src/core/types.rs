//! Shared types used across netpilot modules
//!
//! Contains message structures, tool specifications and the model-facing
//! tool catalogue format.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: String,
    /// Content of the message
    pub content: String,
    /// Optional tool calls made by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke
    pub name: String,
    /// JSON object of argument bindings
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Definition of a tool in the format native tool-calling backends expect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionDefinition,
}

/// Function definition within a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Type of a tool parameter or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamType {
    /// Check whether a JSON value is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Integer => write!(f, "integer"),
            ParamType::Number => write!(f, "number"),
            ParamType::Boolean => write!(f, "boolean"),
            ParamType::Array => write!(f, "array"),
            ParamType::Object => write!(f, "object"),
            ParamType::Any => write!(f, "any"),
        }
    }
}

/// One parameter of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

/// How long one call to a tool may take
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallTimeout {
    /// The sandbox's `tool_timeout`
    #[default]
    SandboxDefault,
    After(Duration),
    /// Runs to completion; used for delegated agent runs
    Unbounded,
}

impl CallTimeout {
    /// Effective limit given the sandbox default; `None` means no limit
    pub fn limit(self, default: Duration) -> Option<Duration> {
        match self {
            CallTimeout::SandboxDefault => Some(default),
            CallTimeout::After(limit) => Some(limit),
            CallTimeout::Unbounded => None,
        }
    }
}

/// Schema-described tool exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique, stable identifier
    pub name: String,
    /// Natural-language description sent to the model
    pub description: String,
    /// Ordered parameter schema
    pub parameters: Vec<ParamSpec>,
    /// Type of the returned value
    pub returns: ParamType,
    /// Per-call timeout
    #[serde(skip)]
    pub timeout: CallTimeout,
}

impl ToolSpec {
    /// Start a spec with no parameters returning a string
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            returns: ParamType::String,
            timeout: CallTimeout::SandboxDefault,
        }
    }

    /// Add a required parameter
    pub fn param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.push(ParamSpec {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        });
        self
    }

    /// Add an optional parameter
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.push(ParamSpec {
            name: name.into(),
            param_type,
            required: false,
            description: description.into(),
        });
        self
    }

    /// Set the return type
    pub fn returns(mut self, returns: ParamType) -> Self {
        self.returns = returns;
        self
    }

    /// Set a per-call timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = CallTimeout::After(timeout);
        self
    }

    /// Exempt calls from any timeout
    pub fn unbounded(mut self) -> Self {
        self.timeout = CallTimeout::Unbounded;
        self
    }

    /// Parameter names in schema order
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// One-line signature for text prompts, e.g. `ping(ip: string) -> string`
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| {
                if p.required {
                    format!("{}: {}", p.name, p.param_type)
                } else {
                    format!("{}: {} = None", p.name, p.param_type)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({}) -> {}", self.name, params, self.returns)
    }

    /// Convert into the JSON-schema catalogue entry
    pub fn to_definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        for p in &self.parameters {
            let mut prop = json!({ "description": p.description });
            if p.param_type != ParamType::Any {
                prop["type"] = json!(p.param_type.to_string());
            }
            properties.insert(p.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        ToolDefinition::function(
            &self.name,
            &self.description,
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show_spec() -> ToolSpec {
        ToolSpec::new("run_show", "Run a show command")
            .param("show_command", ParamType::String, "Command")
            .param("host", ParamType::String, "Device host")
            .optional_param("device_type", ParamType::String, "Netmiko device type")
    }

    #[test]
    fn test_signature() {
        assert_eq!(
            show_spec().signature(),
            "run_show(show_command: string, host: string, device_type: string = None) -> string"
        );
    }

    #[test]
    fn test_to_definition_required_list() {
        let def = show_spec().to_definition();
        assert_eq!(def.tool_type, "function");
        assert_eq!(def.function.name, "run_show");
        assert_eq!(
            def.function.parameters["required"],
            json!(["show_command", "host"])
        );
        assert_eq!(
            def.function.parameters["properties"]["host"]["type"],
            "string"
        );
    }

    #[test]
    fn test_param_type_accepts() {
        assert!(ParamType::String.accepts(&json!("x")));
        assert!(!ParamType::String.accepts(&json!(1)));
        assert!(ParamType::Integer.accepts(&json!(5)));
        assert!(!ParamType::Integer.accepts(&json!(5.5)));
        assert!(ParamType::Number.accepts(&json!(5.5)));
        assert!(ParamType::Any.accepts(&Value::Null));
    }
}
