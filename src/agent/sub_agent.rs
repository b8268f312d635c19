//! Delegation to managed sub-agents
//!
//! A managed agent is exposed to its parent as an ordinary tool with a
//! single `request` parameter. Calling it runs a whole nested agent loop
//! and returns that loop's final answer. A nested run that fails or runs
//! out of steps comes back to the parent as a tool error, so the parent
//! sees it as an error observation and keeps going.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::orchestrator::{Agent, AgentSettings, RunOutcome, TaskRunner};
use crate::core::{NetpilotError, ParamType, Result, ToolSpec};
use crate::llm::LLMProvider;
use crate::sandbox::SandboxPolicy;
use crate::tools::registry::{required_str, ToolArgs, ToolHandler, ToolRegistry};

/// Parameter name of every managed agent tool
pub const REQUEST_PARAM: &str = "request";

/// A sub-agent bound as a tool
pub struct ManagedAgent {
    name: String,
    description: String,
    runner: Arc<dyn TaskRunner>,
}

impl ManagedAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            runner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool spec the parent sees
    pub fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            &self.name,
            format!(
                "Team member '{}': {} Give it your request as a complete sentence with all the context it needs; it returns its answer as text.",
                self.name, self.description
            ),
        )
        .param(
            REQUEST_PARAM,
            ParamType::String,
            "The task for this team member, with any details it needs",
        )
        .unbounded()
    }

    /// Register this managed agent in a parent's registry
    pub fn register(self, registry: &mut ToolRegistry) -> Result<()> {
        registry.register(self.spec(), Arc::new(self))
    }

    /// Wrap the parent's request in the instruction the sub-agent receives
    fn frame(&self, request: &str) -> String {
        format!(
            "You are '{}', a team member working for a manager agent. Your manager submitted this task:\n---\n{}\n---\nAnswer with everything the manager needs to continue; they only see your final answer.",
            self.name, request
        )
    }
}

#[async_trait]
impl ToolHandler for ManagedAgent {
    fn parameters(&self) -> Vec<String> {
        vec![REQUEST_PARAM.to_string()]
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let request = required_str(&args, REQUEST_PARAM)?;
        tracing::info!(agent = %self.name, "delegating request");

        match self.runner.run_task(&self.frame(request)).await {
            RunOutcome::Completed(answer) => Ok(Value::String(answer)),
            RunOutcome::StepLimitExceeded(steps) => Err(NetpilotError::ToolExecution(format!(
                "managed agent '{}' reached its step limit ({} steps) without a final answer",
                self.name,
                steps.len()
            ))),
            RunOutcome::Failed(e) => Err(NetpilotError::ToolExecution(format!(
                "managed agent '{}' failed: {}",
                self.name, e
            ))),
        }
    }
}

/// Builder for managed agents backed by a full [`Agent`]
pub struct ManagedAgentBuilder {
    name: String,
    description: String,
    llm: Option<Arc<dyn LLMProvider>>,
    registry: Option<Arc<ToolRegistry>>,
    policy: SandboxPolicy,
    settings: AgentSettings,
}

impl ManagedAgentBuilder {
    /// Create a new builder with the given name
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            llm: None,
            registry: None,
            policy: SandboxPolicy::default(),
            settings: AgentSettings::default(),
        }
    }

    /// Set the model backend
    pub fn llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the sub-agent's own tool registry
    pub fn tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the sub-agent's sandbox policy
    pub fn policy(mut self, policy: SandboxPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set loop settings
    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the step budget
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.settings.max_steps = max_steps;
        self
    }

    /// Build the ManagedAgent
    pub fn build(self) -> Result<ManagedAgent> {
        let llm = self
            .llm
            .ok_or_else(|| NetpilotError::config(format!("managed agent '{}' has no model backend", self.name)))?;
        let registry = self.registry.unwrap_or_default();
        let agent = Agent::new(self.name.clone(), llm, registry, self.policy, self.settings);
        Ok(ManagedAgent::new(self.name, self.description, Arc::new(agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CallTimeout, ToolCall};
    use crate::sandbox::executor::invoke_tool;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns a fixed outcome and records the task it was given
    struct Stub {
        outcome: fn() -> RunOutcome,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskRunner for Stub {
        async fn run_task(&self, task: &str) -> RunOutcome {
            self.seen.lock().unwrap().push(task.to_string());
            (self.outcome)()
        }
    }

    fn args(request: &str) -> ToolArgs {
        let mut args = ToolArgs::new();
        args.insert(REQUEST_PARAM.into(), json!(request));
        args
    }

    #[tokio::test]
    async fn test_completed_answer_is_returned_verbatim() {
        let stub = Arc::new(Stub {
            outcome: || RunOutcome::Completed("X".into()),
            seen: Mutex::new(Vec::new()),
        });
        let managed = ManagedAgent::new("search", "Searches the web.", stub.clone());
        let out = managed.call(args("find the IOS release notes")).await.unwrap();
        assert_eq!(out, json!("X"));

        let seen = stub.seen.lock().unwrap();
        assert!(seen[0].contains("find the IOS release notes"));
        assert!(seen[0].contains("'search'"));
    }

    #[tokio::test]
    async fn test_step_limit_becomes_tool_error() {
        let stub = Arc::new(Stub {
            outcome: || RunOutcome::StepLimitExceeded(Vec::new()),
            seen: Mutex::new(Vec::new()),
        });
        let managed = ManagedAgent::new("search", "Searches the web.", stub);
        let err = managed.call(args("anything")).await.unwrap_err();
        assert!(matches!(err, NetpilotError::ToolExecution(ref m) if m.contains("step limit")));
    }

    #[test]
    fn test_schema_has_single_request_param() {
        let stub = Arc::new(Stub {
            outcome: || RunOutcome::Completed(String::new()),
            seen: Mutex::new(Vec::new()),
        });
        let managed = ManagedAgent::new("search", "Searches the web.", stub);
        let spec = managed.spec();
        assert_eq!(spec.parameter_names(), vec![REQUEST_PARAM.to_string()]);

        let mut registry = ToolRegistry::new();
        managed.register(&mut registry).unwrap();
        assert!(registry.contains("search"));
    }

    /// Takes longer than the parent's tool timeout
    struct Slow;

    #[async_trait]
    impl TaskRunner for Slow {
        async fn run_task(&self, _task: &str) -> RunOutcome {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            RunOutcome::Completed("X".into())
        }
    }

    #[tokio::test]
    async fn test_slow_sub_run_is_not_timed_out() {
        let mut registry = ToolRegistry::new();
        ManagedAgent::new("search", "Searches the web.", Arc::new(Slow))
            .register(&mut registry)
            .unwrap();
        assert_eq!(registry.spec("search").unwrap().timeout, CallTimeout::Unbounded);

        let call = ToolCall::new("search", json!({"request": "anything"}));
        let out = invoke_tool(&registry, &call, std::time::Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(out, json!("X"));
    }

    #[test]
    fn test_builder_requires_backend() {
        assert!(ManagedAgentBuilder::new("search", "d").build().is_err());
    }
}
