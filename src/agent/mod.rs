//! Agent module - the step engine and delegation
//!
//! Contains the loop that drives one task through model calls and sandboxed
//! actions, and the layer that exposes a whole agent as a tool.

pub mod action;
pub mod loop_state;
pub mod orchestrator;
pub mod prompt;
pub mod sub_agent;

pub use action::{parse_response, ParsedAction};
pub use loop_state::{Action, AgentLoopState, LoopState, Step, Transcript};
pub use orchestrator::{Agent, AgentSettings, RunOutcome, RunReport, TaskRunner};
pub use sub_agent::{ManagedAgent, ManagedAgentBuilder};
