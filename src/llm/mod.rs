//! LLM module - Language Model integrations
//!
//! Provides the backend abstraction with Ollama as the shipped implementation.

pub mod ollama;
pub mod structured;
pub mod traits;

pub use ollama::OllamaClient;
pub use structured::{generate_structured, Structured};
pub use traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};
