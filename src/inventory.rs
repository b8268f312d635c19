//! Typed device facts
//!
//! `show version` output goes to the model together with a JSON schema, and
//! the constrained reply is decoded into [`VersionFacts`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{Message, Result};
use crate::llm::{generate_structured, GenerateOptions, LLMProvider, Structured};
use crate::tools::DeviceAccess;

pub const VERSION_COMMAND: &str = "show version";

const SYSTEM_PROMPT: &str = "You are a helpful networking assistant.";

/// Software facts read from `show version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFacts {
    pub ios_version: String,
    pub configuration_register: String,
}

impl Structured for VersionFacts {
    fn schema() -> Value {
        json!({
            "title": "VersionFacts",
            "type": "object",
            "properties": {
                "ios_version": {
                    "type": "string",
                    "description": "Software version, e.g. 17.9.4a"
                },
                "configuration_register": {
                    "type": "string",
                    "description": "Configuration register, e.g. 0x2102"
                }
            },
            "required": ["ios_version", "configuration_register"]
        })
    }
}

/// Messages asking the model to describe `show version` output
pub fn version_messages(host: &str, show_version: &str) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(format!(
            "What can you say about the Cisco device {}?\nHere is the output of the \"{}\" command:\n{}",
            host, VERSION_COMMAND, show_version
        )),
    ]
}

/// Read `show version` from `host` and extract [`VersionFacts`]
pub async fn version_facts(
    llm: &dyn LLMProvider,
    model: &str,
    options: GenerateOptions,
    access: &DeviceAccess,
    host: &str,
) -> Result<VersionFacts> {
    let output = access.run_trusted(host, VERSION_COMMAND).await?;
    tracing::debug!(host = %host, bytes = output.len(), "show version collected");
    generate_structured(llm, model, &version_messages(host, &output), options).await
}
