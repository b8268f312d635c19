//! Interactive REPL for netpilot
//!
//! Provides the main user interaction loop.

use std::io::{self, BufRead, Write};

use crate::agent::RunOutcome;
use crate::cli::commands::{handle_command, render_transcript, CommandResult};
use crate::core::{Config, Result};
use crate::session::Session;

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    session: Session,
}

impl Repl {
    /// Create a REPL with custom configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self {
            session: Session::new(config)?,
        })
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        print!("Checking model backend...");
        io::stdout().flush()?;

        match self.session.initialize().await {
            Ok(()) => println!(" Ready!\n"),
            Err(e) => {
                println!("\n\nInitialization Error: {}\n", e);
                return Ok(());
            }
        }

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You: ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();

            if input.is_empty() {
                continue;
            }

            match handle_command(input, &mut self.session).await {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::Clear) => {
                    println!("Last run cleared.\n");
                }
                Ok(CommandResult::Handled(output)) => {
                    println!("{}\n", output);
                }
                Ok(CommandResult::Continue(task)) => self.run_task(&task).await,
                Err(e) => {
                    eprintln!("Command error: {}\n", e);
                }
            }
        }

        Ok(())
    }

    async fn run_task(&mut self, task: &str) {
        let debug = self.session.config().agent.debug;
        let report = self.session.run(task).await;

        if debug {
            println!("\n{}\n", render_transcript(report));
            return;
        }
        match &report.outcome {
            RunOutcome::Completed(answer) => println!("\nAssistant:\n{}\n", answer),
            RunOutcome::StepLimitExceeded(steps) => println!(
                "\nNo final answer after {} steps. Type 'transcript' to inspect them.\n",
                steps.len()
            ),
            RunOutcome::Failed(e) => eprintln!("\nError: {}\n", e),
        }
    }

    /// Print the startup banner
    fn print_banner(&self) {
        let config = self.session.config();

        println!(
            r#"
╔═══════════════════════════════════════════════╗
║                                               ║
║   netpilot                                    ║
║   Network operations agent for Cisco IOS      ║
║                                               ║
╚═══════════════════════════════════════════════╝
"#
        );
        println!("Ollama:     {}", config.ollama_url());
        println!("Model:      {}", config.model.name);
        println!("Max steps:  {}", config.agent.max_steps);
        println!("Hosts file: {}", config.devices.hosts_file.display());
        println!();
        println!("Commands: help, status, tools, transcript, exit");
        println!("─────────────────────────────────────────────────");
    }
}
