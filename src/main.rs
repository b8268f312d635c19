//! netpilot - Network operations agent
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;

use clap::Parser;
use netpilot::{telemetry, Config, Repl, RunOutcome, Session};

/// netpilot - Network operations agent for Cisco IOS devices
#[derive(Parser, Debug)]
#[command(name = "netpilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,

    /// Model driving the agents
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Step budget of the manager agent
    #[arg(long)]
    max_steps: Option<usize>,

    /// JSON file mapping host to credentials
    #[arg(long)]
    hosts: Option<PathBuf>,

    /// Add the delegated web-search agent
    #[arg(long)]
    search: bool,

    /// Let the agent read and write files under this directory
    #[arg(long, value_name = "DIR")]
    grant_files: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(model) = args.model {
        config.model.name = model;
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    if let Some(hosts) = args.hosts {
        config.devices.hosts_file = hosts;
    }
    if args.search {
        config.search.enabled = true;
    }
    if let Some(root) = args.grant_files {
        config.sandbox.file_root = Some(root);
    }
    if args.debug {
        config.agent.debug = true;
    }

    let _telemetry = telemetry::init(&config.telemetry, config.agent.debug);

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let mut session = Session::new(config)?;
        session.initialize().await?;

        let report = session.run(&prompt).await;
        return match &report.outcome {
            RunOutcome::Completed(answer) => {
                println!("{}", answer);
                Ok(())
            }
            RunOutcome::StepLimitExceeded(steps) => Err(anyhow::anyhow!(
                "no final answer after {} steps",
                steps.len()
            )),
            RunOutcome::Failed(e) => Err(anyhow::anyhow!("run failed: {}", e)),
        };
    }

    // Interactive REPL mode
    let mut repl = Repl::with_config(config)?;
    repl.run().await?;

    Ok(())
}
