//! Agent orchestrator
//!
//! Runs the step engine: ask the model, parse its action, execute it in the
//! sandbox, fold the observation into the transcript, repeat. Steps are
//! strictly sequential and the model call is the only place the loop waits
//! on the backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::Instrument;

use crate::agent::action::{parse_response, ParsedAction};
use crate::agent::loop_state::{Action, AgentLoopState, LoopState, Step, Transcript};
use crate::agent::prompt;
use crate::core::{Config, NetpilotError, ToolDefinition};
use crate::llm::{GenerateOptions, LLMProvider, LLMResponse};
use crate::sandbox::{ExecutionOutcome, SandboxPolicy, SandboxedExecutor};
use crate::tools::ToolRegistry;

/// Stops the model from writing observations of its own
const OBSERVATION_STOP: &str = "\nObservation";

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The model gave a final answer
    Completed(String),
    /// The step budget ran out; carries the partial transcript
    StepLimitExceeded(Vec<Step>),
    /// An unrecoverable error, such as the backend staying unreachable
    Failed(NetpilotError),
}

impl RunOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Outcome plus the full transcript of the run
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub transcript: Transcript,
}

/// Anything that can take a task to completion
///
/// Implemented by [`Agent`]; the delegation layer only depends on this.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task: &str) -> RunOutcome;
}

/// Per-agent loop settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub max_steps: usize,
    /// Extra attempts after a failed model call
    pub model_retries: u32,
    pub retry_backoff: Duration,
    pub temperature: f32,
    pub num_ctx: Option<u32>,
    /// Prepended to the generated system prompt
    pub system_prompt: Option<String>,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.name.clone(),
            max_steps: config.agent.max_steps,
            model_retries: config.agent.model_retries,
            retry_backoff: Duration::from_millis(config.agent.retry_backoff_ms),
            temperature: config.model.temperature,
            num_ctx: Some(config.model.num_ctx),
            system_prompt: config.agent.system_prompt.clone(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One agent: a model, a sandbox over a tool registry, and loop settings
pub struct Agent {
    name: String,
    llm: Arc<dyn LLMProvider>,
    executor: SandboxedExecutor,
    settings: AgentSettings,
    system_prompt: String,
    definitions: Vec<ToolDefinition>,
}

impl Agent {
    /// Create an agent; the registry is read-only from here on
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LLMProvider>,
        registry: Arc<ToolRegistry>,
        policy: SandboxPolicy,
        settings: AgentSettings,
    ) -> Self {
        let system_prompt =
            prompt::system_prompt(&registry, &policy, settings.system_prompt.as_deref());
        let definitions = registry.definitions();
        Self {
            name: name.into(),
            llm,
            executor: SandboxedExecutor::new(registry, policy),
            settings,
            system_prompt,
            definitions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run a task to completion, step limit, or failure
    pub async fn run(&self, task: &str) -> RunOutcome {
        self.run_detailed(task).await.outcome
    }

    /// Like [`Agent::run`], also returning the transcript
    pub async fn run_detailed(&self, task: &str) -> RunReport {
        let span = tracing::info_span!("agent_run", agent = %self.name, max_steps = self.settings.max_steps);
        self.run_loop(task).instrument(span).await
    }

    async fn run_loop(&self, task: &str) -> RunReport {
        let mut state = AgentLoopState::new(self.settings.max_steps);
        tracing::info!(task = %task, "starting run");

        loop {
            let step_number = state.step_count() + 1;
            state.await_model();

            let messages = prompt::build_messages(&self.system_prompt, task, state.transcript());
            let response = match self.call_model(&messages, step_number).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, step = step_number, "run failed");
                    state.fail();
                    return RunReport {
                        outcome: RunOutcome::Failed(e),
                        transcript: state.into_transcript(),
                    };
                }
            };

            let model_output = render_model_output(&response);
            let (action, outcome) = match parse_response(&response) {
                Ok(ParsedAction::FinalAnswer(answer)) => {
                    tracing::info!(steps = state.step_count(), "final answer");
                    state.complete();
                    return RunReport {
                        outcome: RunOutcome::Completed(answer),
                        transcript: state.into_transcript(),
                    };
                }
                Ok(ParsedAction::Tool(call)) => {
                    state.execute();
                    tracing::info!(step = step_number, tool = %call.name, "executing tool call");
                    let outcome = self.executor.execute_tool_call(&call).await;
                    (Action::ToolCall(call), outcome)
                }
                Ok(ParsedAction::Code(source)) => {
                    state.execute();
                    tracing::info!(step = step_number, "executing code");
                    let outcome = self.executor.execute_code(&source).await;
                    (Action::Code { source }, outcome)
                }
                Err(e) => {
                    state.execute();
                    tracing::warn!(step = step_number, error = %e, "malformed model output");
                    let outcome = ExecutionOutcome {
                        observation: format!("Error: {}. Please retry with a valid action.", e),
                        final_answer: None,
                        error: Some(e),
                    };
                    (Action::Malformed, outcome)
                }
            };

            let final_answer = outcome.final_answer;
            let step = Step {
                index: step_number,
                model_output,
                action,
                observation: outcome.observation,
                error: outcome.error.map(|e| e.to_string()),
            };
            if step.is_error() {
                tracing::debug!(step = step_number, observation = %step.observation, "step failed");
            }

            let next = state.record(step);
            if let Some(answer) = final_answer {
                tracing::info!(steps = state.step_count(), "final answer from code");
                state.complete();
                return RunReport {
                    outcome: RunOutcome::Completed(answer),
                    transcript: state.into_transcript(),
                };
            }

            if next == LoopState::StepLimitExceeded {
                tracing::warn!(steps = state.step_count(), "step limit reached");
                let transcript = state.into_transcript();
                return RunReport {
                    outcome: RunOutcome::StepLimitExceeded(transcript.steps().to_vec()),
                    transcript,
                };
            }
        }
    }

    /// Call the model, retrying transient failures with jittered backoff
    async fn call_model(
        &self,
        messages: &[crate::core::Message],
        step: usize,
    ) -> crate::core::Result<LLMResponse> {
        let options = GenerateOptions {
            temperature: Some(self.settings.temperature),
            num_ctx: self.settings.num_ctx,
            stop: vec![OBSERVATION_STOP.to_string()],
            format: None,
        };

        let mut attempt = 0;
        loop {
            let span = tracing::info_span!("model_call", step, attempt, model = %self.settings.model);
            let result = self
                .llm
                .chat_with_tools(
                    &self.settings.model,
                    messages,
                    &self.definitions,
                    Some(options.clone()),
                )
                .instrument(span)
                .await;

            match result {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        tracing::debug!(tokens = usage.total(), "model responded");
                    }
                    if response.truncated {
                        tracing::warn!(step, "model output hit the token limit");
                    }
                    return Ok(response);
                }
                Err(e @ NetpilotError::ModelNotFound(_)) => return Err(e),
                Err(e) if attempt < self.settings.model_retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "model call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(match e {
                        NetpilotError::ModelBackend(_) => e,
                        other => NetpilotError::backend(format!(
                            "{} (after {} attempts)",
                            other,
                            attempt + 1
                        )),
                    })
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.settings.retry_backoff.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(10));
        let jitter = if base > 0 {
            rand::rng().random_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(exp + jitter)
    }
}

#[async_trait]
impl TaskRunner for Agent {
    async fn run_task(&self, task: &str) -> RunOutcome {
        self.run(task).await
    }
}

/// The text recorded as a step's model output
fn render_model_output(response: &LLMResponse) -> String {
    let content = response.content.trim();
    match response.tool_calls.first() {
        Some(call) => {
            let call_json = serde_json::json!({ "name": call.name, "arguments": call.arguments });
            if content.is_empty() {
                call_json.to_string()
            } else {
                format!("{}\n{}", content, call_json)
            }
        }
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Message, ParamType, Result, ToolCall, ToolSpec};
    use crate::tools::FnTool;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses; errors once exhausted
    struct Scripted {
        responses: Mutex<VecDeque<Result<LLMResponse>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<LLMResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for Scripted {
        async fn chat_with_tools(
            &self,
            _model: &str,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _options: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(NetpilotError::backend("script exhausted")))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec!["scripted".into()])
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn agent(llm: Arc<Scripted>, max_steps: usize) -> Agent {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolSpec::new("ping", "Ping").param("ip", ParamType::String, "Target"),
                Arc::new(FnTool::new(&["ip"], |_| async { Ok(json!("reachable")) })),
            )
            .unwrap();
        let settings = AgentSettings {
            max_steps,
            model_retries: 1,
            retry_backoff: Duration::from_millis(1),
            ..AgentSettings::default()
        };
        Agent::new("test", llm, Arc::new(registry), SandboxPolicy::default(), settings)
    }

    #[tokio::test]
    async fn test_final_answer_without_steps() {
        let llm = Scripted::new(vec![Ok(LLMResponse::text("Final Answer: nothing to do"))]);
        let report = agent(llm, 3).run_detailed("noop").await;
        assert_eq!(report.outcome.answer(), Some("nothing to do"));
        assert!(report.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_output_is_a_step() {
        let llm = Scripted::new(vec![
            Ok(LLMResponse::text("hmm, let me think")),
            Ok(LLMResponse::text("Final Answer: ok")),
        ]);
        let report = agent(llm, 3).run_detailed("task").await;
        assert!(report.outcome.is_completed());
        assert_eq!(report.transcript.len(), 1);
        assert_eq!(report.transcript.steps()[0].action, Action::Malformed);
        assert!(report.transcript.steps()[0].observation.starts_with("Error: Malformed action"));
    }

    #[tokio::test]
    async fn test_backend_failure_after_retries() {
        let llm = Scripted::new(vec![
            Err(NetpilotError::backend("connection refused")),
            Err(NetpilotError::backend("connection refused")),
        ]);
        let outcome = agent(llm, 3).run("task").await;
        assert!(matches!(outcome, RunOutcome::Failed(NetpilotError::ModelBackend(_))));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let llm = Scripted::new(vec![
            Err(NetpilotError::backend("timeout")),
            Ok(LLMResponse::tool_call(ToolCall::new("ping", json!({"ip": "10.0.0.1"})))),
            Ok(LLMResponse::text("Final Answer: up")),
        ]);
        let report = agent(llm, 3).run_detailed("task").await;
        assert_eq!(report.outcome.answer(), Some("up"));
        assert_eq!(report.transcript.steps()[0].observation, "reachable");
    }

    #[tokio::test]
    async fn test_code_final_answer_records_step() {
        let llm = Scripted::new(vec![Ok(LLMResponse::text(
            "```py\nr = ping('10.0.0.1')\nfinal_answer(r)\n```",
        ))]);
        let report = agent(llm, 3).run_detailed("task").await;
        assert_eq!(report.outcome.answer(), Some("reachable"));
        assert_eq!(report.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_steps_still_takes_one() {
        let llm = Scripted::new(vec![Ok(LLMResponse::tool_call(ToolCall::new(
            "ping",
            json!({"ip": "10.0.0.1"}),
        )))]);
        let outcome = agent(llm, 0).run("task").await;
        assert!(matches!(outcome, RunOutcome::StepLimitExceeded(steps) if steps.len() == 1));
    }
}
