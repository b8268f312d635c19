//! Agent loop state management
//!
//! Tracks the step engine's state machine and the append-only transcript
//! that is the loop's only memory.

use std::fmt;

use serde::Serialize;

use crate::core::ToolCall;

/// States of one agent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Running,
    AwaitingModel,
    Executing,
    Completed,
    Failed,
    StepLimitExceeded,
}

impl LoopState {
    /// Whether the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::Completed | LoopState::Failed | LoopState::StepLimitExceeded
        )
    }
}

/// The action a step carried out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    ToolCall(ToolCall),
    Code { source: String },
    /// The model output could not be parsed
    Malformed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ToolCall(call) => write!(f, "{}({})", call.name, call.arguments),
            Action::Code { source } => write!(f, "code ({} lines)", source.lines().count()),
            Action::Malformed => write!(f, "malformed"),
        }
    }
}

/// One executed step
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// 1-based position in the transcript
    pub index: usize,
    /// Raw model output for this step
    pub model_output: String,
    pub action: Action,
    /// Text fed back to the model
    pub observation: String,
    /// Rendered step-level error, if the action failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Append-only sequence of steps
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    steps: Vec<Step>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, assigning its index
    pub fn push(&mut self, mut step: Step) -> &Step {
        step.index = self.steps.len() + 1;
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// State of one run: current state, step budget and transcript
#[derive(Debug, Clone)]
pub struct AgentLoopState {
    state: LoopState,
    /// Maximum number of steps
    pub max_steps: usize,
    transcript: Transcript,
}

impl AgentLoopState {
    /// Start a run in `Running`
    pub fn new(max_steps: usize) -> Self {
        Self {
            state: LoopState::Running,
            max_steps,
            transcript: Transcript::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    /// Steps taken so far
    pub fn step_count(&self) -> usize {
        self.transcript.len()
    }

    /// Running -> AwaitingModel
    pub fn await_model(&mut self) {
        debug_assert_eq!(self.state, LoopState::Running);
        self.state = LoopState::AwaitingModel;
    }

    /// AwaitingModel -> Executing
    pub fn execute(&mut self) {
        debug_assert_eq!(self.state, LoopState::AwaitingModel);
        self.state = LoopState::Executing;
    }

    /// Executing -> Running, or StepLimitExceeded once the count exceeds the maximum
    pub fn record(&mut self, step: Step) -> LoopState {
        self.transcript.push(step);
        self.state = if self.transcript.len() > self.max_steps {
            LoopState::StepLimitExceeded
        } else {
            LoopState::Running
        };
        self.state
    }

    /// Any state -> Completed
    pub fn complete(&mut self) {
        self.state = LoopState::Completed;
    }

    /// Any state -> Failed
    pub fn fail(&mut self) {
        self.state = LoopState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(observation: &str) -> Step {
        Step {
            index: 0,
            model_output: String::new(),
            action: Action::ToolCall(ToolCall::new("ping", json!({"ip": "10.0.0.1"}))),
            observation: observation.to_string(),
            error: None,
        }
    }

    #[test]
    fn test_loop_state_new() {
        let state = AgentLoopState::new(10);
        assert_eq!(state.state(), LoopState::Running);
        assert_eq!(state.max_steps, 10);
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn test_step_limit_reached_exactly() {
        let mut state = AgentLoopState::new(2);
        state.await_model();
        state.execute();
        assert_eq!(state.record(step("a")), LoopState::Running);

        state.await_model();
        state.execute();
        assert_eq!(state.record(step("b")), LoopState::Running);

        state.await_model();
        state.execute();
        assert_eq!(state.record(step("c")), LoopState::StepLimitExceeded);
        assert!(state.state().is_terminal());
        assert_eq!(state.step_count(), 3);
    }

    #[test]
    fn test_transcript_indexes() {
        let mut transcript = Transcript::new();
        transcript.push(step("first"));
        let second = transcript.push(step("second"));
        assert_eq!(second.index, 2);
        assert_eq!(transcript.steps()[0].index, 1);
    }

    #[test]
    fn test_action_display() {
        let action = Action::Code {
            source: "a = 1\nprint(a)".into(),
        };
        assert_eq!(action.to_string(), "code (2 lines)");
    }
}
