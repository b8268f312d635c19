//! Prompt construction
//!
//! The model sees the system prompt with the tool catalogue, the task, and
//! then each prior step as an assistant turn followed by its observation.

use crate::agent::loop_state::Transcript;
use crate::core::Message;
use crate::sandbox::SandboxPolicy;
use crate::tools::ToolRegistry;

const INSTRUCTIONS: &str = r#"You solve tasks step by step. In each step, reply with exactly one of:

1. A single tool call, as a JSON object:
   {"name": "<tool name>", "arguments": {"<parameter>": <value>}}
2. Python-style code in a fenced block. Tools are callable functions inside the
   code; use print() to record what you need for the next step:
   ```py
   route = show_ip_route(host="10.0.0.1", username=user, password=pw, device_type="cisco_ios")
   print(route)
   ```
   Call final_answer(answer) from code once you have the result.
3. When the task is complete:
   Final Answer: <your answer>

Rules:
- Only the listed tools and these imports are available: {imports}.
- Variables do not persist between steps. Carry forward what you need by printing it.
- After each step you receive an Observation. Read it before deciding the next step.
- If an observation starts with "Error:", fix the problem or try another approach."#;

/// Build the system prompt for a registry and policy
pub fn system_prompt(registry: &ToolRegistry, policy: &SandboxPolicy, preamble: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(preamble) = preamble.filter(|p| !p.trim().is_empty()) {
        prompt.push_str(preamble.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str(&INSTRUCTIONS.replace("{imports}", &policy.authorized_imports().join(", ")));
    prompt.push_str("\n\n## Tools\n");
    for spec in registry.describe() {
        prompt.push_str(&format!("- {}: {}\n", spec.signature(), spec.description));
    }
    prompt.push_str("- final_answer(answer: any) -> any: Give the final answer to the task.\n");
    prompt
}

/// Messages for the next model call
pub fn build_messages(system: &str, task: &str, transcript: &Transcript) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2 + transcript.len() * 2);
    messages.push(Message::system(system));
    messages.push(Message::user(format!("New task:\n{}", task)));

    for step in transcript.steps() {
        messages.push(Message::assistant(step.model_output.clone()));
        messages.push(Message::user(format!(
            "Observation (step {}):\n{}",
            step.index, step.observation
        )));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::loop_state::{Action, Step};
    use crate::core::{ParamType, ToolSpec};
    use crate::tools::FnTool;
    use serde_json::Value;
    use std::sync::Arc;

    #[test]
    fn test_system_prompt_lists_tools_in_order() {
        let mut registry = ToolRegistry::new();
        for name in ["show_ip_route", "ping"] {
            registry
                .register(
                    ToolSpec::new(name, format!("{} tool", name)).param("host", ParamType::String, "h"),
                    Arc::new(FnTool::new(&["host"], |_| async { Ok(Value::Null) })),
                )
                .unwrap();
        }
        let prompt = system_prompt(&registry, &SandboxPolicy::default(), Some("You manage routers."));
        assert!(prompt.starts_with("You manage routers."));
        let route = prompt.find("- show_ip_route(host: string)").unwrap();
        let ping = prompt.find("- ping(host: string)").unwrap();
        assert!(route < ping);
        assert!(prompt.contains("json, math"));
    }

    #[test]
    fn test_messages_replay_transcript() {
        let mut transcript = Transcript::new();
        transcript.push(Step {
            index: 0,
            model_output: "{\"name\": \"ping\"}".into(),
            action: Action::Malformed,
            observation: "reachable".into(),
            error: None,
        });
        let messages = build_messages("sys", "ping 10.0.0.1", &transcript);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "Observation (step 1):\nreachable");
    }
}
