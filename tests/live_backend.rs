//! Runs against a real Ollama server
//!
//! These need a running Ollama with the configured model pulled.

use std::time::Duration;

use netpilot::core::Config;
use netpilot::Session;
use tokio::time::timeout;

/// Helper to create a session, or skip when the backend is missing
async fn create_session(max_steps: usize) -> Option<Session> {
    let mut config = Config::default();
    config.agent.max_steps = max_steps;
    config.search.enabled = false;

    let session = Session::new(config).ok()?;
    match session.initialize().await {
        Ok(()) => Some(session),
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            None
        }
    }
}

#[tokio::test]
#[ignore] // Requires Ollama
async fn test_agent_ping_localhost() {
    let Some(mut session) = create_session(4).await else {
        return;
    };

    let report = timeout(
        Duration::from_secs(300),
        session.run("Is 127.0.0.1 reachable from the agent?"),
    )
    .await
    .expect("Task timed out");

    assert!(!report.transcript.is_empty(), "no tool was used");
}

#[tokio::test]
#[ignore] // Requires Ollama
async fn test_arithmetic_in_code() {
    let Some(mut session) = create_session(3).await else {
        return;
    };

    let report = timeout(
        Duration::from_secs(300),
        session.run("Compute 17 * 23 with a code snippet and give the number as the final answer."),
    )
    .await
    .expect("Task timed out");

    assert!(report.outcome.answer().is_some_and(|a| a.contains("391")));
}
