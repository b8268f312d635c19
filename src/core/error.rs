//! Error types for netpilot
//!
//! One enum covers registry construction, sandbox capability violations,
//! tool faults and model backend failures. Step-level variants are turned
//! into observations by the agent loop; only a few ever end a run.

use thiserror::Error;

/// Main error type for netpilot operations
#[derive(Error, Debug)]
pub enum NetpilotError {
    /// Import of a module outside the sandbox allow-list
    #[error("Import of module '{0}' is not allowed. Authorized imports: {1}")]
    CapabilityDenied(String, String),

    /// Reference to an identifier the sandbox does not expose
    #[error("Name '{0}' is not defined or not allowed in this sandbox")]
    NameNotAllowed(String),

    /// Tool name not present in the registry
    #[error("Unknown tool '{0}'. Available tools: {1}")]
    UnknownTool(String, String),

    /// Handler parameters disagree with the declared schema
    #[error("Schema mismatch for tool '{tool}': schema declares {schema:?}, handler takes {handler:?}")]
    SchemaMismatch {
        tool: String,
        schema: Vec<String>,
        handler: Vec<String>,
    },

    /// Tool name registered twice
    #[error("Tool '{0}' is already registered")]
    DuplicateName(String),

    /// A tool handler failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// A tool handler did not return within its timeout
    #[error("Tool '{0}' timed out after {1:?}")]
    ToolTimeout(String, std::time::Duration),

    /// Model backend unreachable or returned an unusable response
    #[error("Model backend error: {0}")]
    ModelBackend(String),

    /// Step budget spent without a final answer
    #[error("Reached max steps ({0}) without a final answer")]
    StepLimitExceeded(usize),

    /// Model output matched neither a final answer nor an action
    #[error("Malformed action: {0}")]
    MalformedAction(String),

    /// Model not available on the backend
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// Credential lookup failures
    #[error("Credential error: {0}")]
    Credential(String),

    /// Device transport failures (connect, auth, command)
    #[error("Device error: {0}")]
    Device(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for netpilot operations
pub type Result<T> = std::result::Result<T, NetpilotError>;

impl NetpilotError {
    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a model backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::ModelBackend(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a device error
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a malformed action error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedAction(msg.into())
    }

    /// Whether this error ends a run instead of becoming an observation
    pub fn is_run_terminating(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName(_)
                | Self::SchemaMismatch { .. }
                | Self::ModelBackend(_)
                | Self::ModelNotFound(_)
        )
    }
}
