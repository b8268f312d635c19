//! CLI commands
//!
//! Special commands that can be executed in the REPL.

use crate::agent::{RunOutcome, RunReport};
use crate::core::Result;
use crate::session::Session;

/// Result of parsing a command
pub enum CommandResult {
    /// Continue processing as a task
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
    /// Forget the last run
    Clear,
}

/// Parse and handle special commands
pub async fn handle_command(input: &str, session: &mut Session) -> Result<CommandResult> {
    let input = input.trim();
    let (cmd, args) = match input.split_once(' ') {
        Some((cmd, args)) => (cmd.to_lowercase(), args.trim()),
        None => (input.to_lowercase(), ""),
    };

    match cmd.trim_start_matches('/') {
        "exit" | "quit" | "q" => Ok(CommandResult::Exit),

        "clear" | "reset" => {
            session.clear_report();
            Ok(CommandResult::Clear)
        }

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "models" => {
            let models = session.list_models().await?;
            Ok(CommandResult::Handled(format!(
                "Available models:\n{}\n\nCurrent: {}",
                models
                    .iter()
                    .map(|m| format!("  - {}", m))
                    .collect::<Vec<_>>()
                    .join("\n"),
                session.config().model.name
            )))
        }

        "status" => Ok(CommandResult::Handled(status_text(session))),

        "tools" => {
            let registry = session.agent().registry();
            let lines: Vec<String> = registry
                .describe()
                .iter()
                .map(|spec| format!("  {}\n    {}", spec.signature(), spec.description))
                .collect();
            Ok(CommandResult::Handled(format!(
                "Tools ({}):\n{}",
                registry.len(),
                lines.join("\n")
            )))
        }

        "transcript" => Ok(CommandResult::Handled(match session.last_report() {
            Some(report) => render_transcript(report),
            None => "No task has run yet.".to_string(),
        })),

        "set" => handle_set_command(args, session),

        "facts" => {
            if args.is_empty() {
                return Ok(CommandResult::Handled("Usage: facts <host>".to_string()));
            }
            let facts = session.version_facts(args).await?;
            Ok(CommandResult::Handled(format!(
                "{}\n  IOS version:      {}\n  Config register:  {}",
                args, facts.ios_version, facts.configuration_register
            )))
        }

        "save" => {
            let path = session.config().save()?;
            Ok(CommandResult::Handled(format!(
                "Configuration saved to {}",
                path.display()
            )))
        }

        _ => {
            if input.starts_with('/') {
                Ok(CommandResult::Handled(format!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    cmd
                )))
            } else {
                Ok(CommandResult::Continue(input.to_string()))
            }
        }
    }
}

/// Handle 'set' subcommands
fn handle_set_command(args: &str, session: &mut Session) -> Result<CommandResult> {
    let (key, value) = match args.split_once(' ') {
        Some((key, value)) => (key.to_lowercase(), value.trim().to_string()),
        None => (args.to_lowercase(), String::new()),
    };

    if key.is_empty() {
        return Ok(CommandResult::Handled(
            "Usage: set <max_steps|model|debug> <value>\n\
             Examples:\n\
               set max_steps 15\n\
               set model qwen2.5:14b\n\
               set debug on"
                .to_string(),
        ));
    }

    match key.as_str() {
        "max_steps" | "steps" => {
            if value.is_empty() {
                return Ok(CommandResult::Handled(format!(
                    "Current max_steps: {}",
                    session.config().agent.max_steps
                )));
            }
            let Ok(steps) = value.parse::<usize>() else {
                return Ok(CommandResult::Handled(format!(
                    "max_steps must be a non-negative integer, got '{}'",
                    value
                )));
            };
            session.reconfigure(|c| c.agent.max_steps = steps)?;
            Ok(CommandResult::Handled(format!("max_steps set to: {}", steps)))
        }

        "model" => {
            if value.is_empty() {
                return Ok(CommandResult::Handled(format!(
                    "Current model: {}",
                    session.config().model.name
                )));
            }
            session.reconfigure(|c| c.model.name = value.clone())?;
            Ok(CommandResult::Handled(format!("Model set to: {}", value)))
        }

        "debug" => {
            let enabled = matches!(value.to_lowercase().as_str(), "on" | "true" | "1" | "yes");
            session.reconfigure(|c| c.agent.debug = enabled)?;
            Ok(CommandResult::Handled(format!(
                "Debug mode: {}",
                if enabled { "ON" } else { "OFF" }
            )))
        }

        _ => Ok(CommandResult::Handled(format!(
            "Unknown setting: {}. Available: max_steps, model, debug",
            key
        ))),
    }
}

fn status_text(session: &Session) -> String {
    let config = session.config();
    format!(
        "netpilot status:\n\
         ─────────────────────────────\n\
         Model:      {}\n\
         Max steps:  {}\n\
         Tools:      {}\n\
         Search:     {}\n\
         File root:  {}\n\
         Hosts file: {}\n\
         Imports:    {}\n\
         Debug:      {}",
        config.model.name,
        config.agent.max_steps,
        session.agent().registry().len(),
        if config.search.enabled {
            "enabled"
        } else {
            "disabled"
        },
        config
            .sandbox
            .file_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string()),
        config.devices.hosts_file.display(),
        config.sandbox.authorized_imports.join(", "),
        if config.agent.debug { "on" } else { "off" }
    )
}

/// Human-readable view of a run
pub fn render_transcript(report: &RunReport) -> String {
    let mut out = String::new();
    for step in report.transcript.steps() {
        out.push_str(&format!(
            "── Step {} {}\n{}\n\nObservation:\n{}\n\n",
            step.index,
            if step.is_error() { "(error)" } else { "" },
            step.action,
            step.observation
        ));
    }
    out.push_str(&match &report.outcome {
        RunOutcome::Completed(answer) => format!("Final answer: {}", answer),
        RunOutcome::StepLimitExceeded(steps) => {
            format!("Stopped after {} steps without a final answer", steps.len())
        }
        RunOutcome::Failed(e) => format!("Run failed: {}", e),
    });
    out
}

/// Generate help text
fn help_text() -> String {
    r#"netpilot commands:
─────────────────────────────────────────────
  help, ?          Show this help message
  exit, quit, q    Exit netpilot
  clear            Forget the last run
  status           Show current configuration
  tools            List the tools the agent can call
  models           List available Ollama models
  transcript       Show the steps of the last run
  save             Write the current settings to the config file
  facts <host>     Extract version facts from a device's show version

  set max_steps <n>     Set the step budget
  set model <model>     Set the model
  set debug <on|off>    Print the transcript after every run

Anything else is sent to the agent as a task.
─────────────────────────────────────────────"#
        .to_string()
}
