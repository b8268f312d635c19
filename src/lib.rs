//! netpilot - Network operations agent
//!
//! A tool-calling agent for Cisco IOS devices. A local model served by
//! Ollama picks one action per step (a tool call or a short script); the
//! action runs in a capability-restricted sandbox and its observation is fed
//! back until the model gives a final answer or the step budget runs out.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Model backend abstraction with the Ollama implementation
//! - **Tools**: Tool registry, device tools, web search, file grant
//! - **Sandbox**: Interpreter and executor for model-authored actions
//! - **Agent**: The step engine and managed-agent delegation
//! - **Inventory**: Schema-constrained extraction of device facts
//! - **Session**: Wires registry, sub-agents and the manager from config
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use netpilot::{Config, Session};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut session = Session::new(Config::load()).unwrap();
//!     session.initialize().await.unwrap();
//!
//!     let report = session.run("Is 10.10.20.48 reachable from the agent?").await;
//!     println!("{:?}", report.outcome.answer());
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod inventory;
pub mod llm;
pub mod sandbox;
pub mod session;
pub mod telemetry;
pub mod tools;

// Re-export commonly used items
pub use agent::{Agent, AgentSettings, ManagedAgent, RunOutcome, RunReport};
pub use cli::Repl;
pub use core::{Config, NetpilotError, Result};
pub use sandbox::SandboxPolicy;
pub use session::Session;
pub use tools::ToolRegistry;
