//! Sandboxed execution of a single step's action
//!
//! Every failure here becomes part of the observation handed back to the
//! model. Nothing in this module ends a run.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::Instrument;

use crate::core::{NetpilotError, Result, ToolCall};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::value::to_display;
use crate::sandbox::SandboxPolicy;
use crate::tools::ToolRegistry;

/// What one executed action produced
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Text fed back to the model
    pub observation: String,
    /// Set when the action called `final_answer`
    pub final_answer: Option<String>,
    /// The step-level error, already rendered into `observation`
    pub error: Option<NetpilotError>,
}

impl ExecutionOutcome {
    fn ok(observation: String) -> Self {
        Self {
            observation,
            final_answer: None,
            error: None,
        }
    }

    fn failed(error: NetpilotError, logs: &str) -> Self {
        let mut observation = format!("Error: {}", error);
        if !logs.trim().is_empty() {
            observation.push_str(&format!("\nExecution logs:\n{}", logs.trim_end()));
        }
        Self {
            observation,
            final_answer: None,
            error: Some(error),
        }
    }
}

/// Validate, bind and run one tool call under its timeout
///
/// Handler failures are wrapped as `ToolExecution` so callers see one error
/// kind for anything the tool itself raised.
pub async fn invoke_tool(
    registry: &ToolRegistry,
    call: &ToolCall,
    default_timeout: Duration,
) -> Result<Value> {
    let (args, spec, handler) = registry.bind(call)?;
    let limit = spec.timeout.limit(default_timeout);
    let span = tracing::info_span!("tool_execution", tool = %call.name);

    async move {
        tracing::debug!(arguments = %call.arguments, "calling tool");
        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, handler.call(args)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(timeout_ms = limit.as_millis() as u64, "tool timed out");
                    return Err(NetpilotError::ToolTimeout(call.name.clone(), limit));
                }
            },
            None => handler.call(args).await,
        };
        match result {
            Ok(output) => {
                tracing::debug!("tool returned");
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(error = %e, "tool failed");
                Err(match e {
                    NetpilotError::ToolExecution(_) | NetpilotError::ToolTimeout(..) => e,
                    other => NetpilotError::ToolExecution(other.to_string()),
                })
            }
        }
    }
    .instrument(span)
    .await
}

/// Runs tool calls and code blocks against a fixed registry and policy
pub struct SandboxedExecutor {
    registry: Arc<ToolRegistry>,
    policy: SandboxPolicy,
}

impl SandboxedExecutor {
    pub fn new(registry: Arc<ToolRegistry>, policy: SandboxPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Execute a single structured tool call
    ///
    /// The observation is the tool's output as text.
    pub async fn execute_tool_call(&self, call: &ToolCall) -> ExecutionOutcome {
        match invoke_tool(&self.registry, call, self.policy.tool_timeout).await {
            Ok(output) => ExecutionOutcome::ok(to_display(&output)),
            Err(e) => ExecutionOutcome::failed(e, ""),
        }
    }

    /// Execute a model-authored code block in a fresh scope
    pub async fn execute_code(&self, code: &str) -> ExecutionOutcome {
        let run = Interpreter::new(&self.registry, &self.policy).run(code).await;

        if let Some(e) = run.error {
            tracing::debug!(error = %e, "code step failed");
            return ExecutionOutcome::failed(e, &run.stdout);
        }

        let (output, final_answer) = match run.final_answer {
            Some(answer) => {
                let text = to_display(&answer);
                (text.clone(), Some(text))
            }
            None => (to_display(&run.last_value), None),
        };

        ExecutionOutcome {
            observation: format!(
                "Execution logs:\n{}\nLast output from code snippet:\n{}",
                run.stdout.trim_end(),
                output
            ),
            final_answer,
            error: None,
        }
    }
}
