//! A manager agent delegating to a managed search agent

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{settings, ScriptedModel};
use netpilot::agent::{Agent, ManagedAgentBuilder};
use netpilot::core::ToolCall;
use netpilot::llm::LLMResponse;
use netpilot::sandbox::SandboxPolicy;
use netpilot::tools::ToolRegistry;
use serde_json::json;

fn manager(parent: Arc<ScriptedModel>, child: Arc<ScriptedModel>, child_steps: usize) -> Agent {
    manager_with_policy(parent, child, child_steps, SandboxPolicy::default())
}

fn manager_with_policy(
    parent: Arc<ScriptedModel>,
    child: Arc<ScriptedModel>,
    child_steps: usize,
    policy: SandboxPolicy,
) -> Agent {
    let mut registry = ToolRegistry::new();
    ManagedAgentBuilder::new("search", "Searches the web.")
        .llm(child)
        .settings(settings(5))
        .max_steps(child_steps)
        .build()
        .unwrap()
        .register(&mut registry)
        .unwrap();
    Agent::new(
        "netpilot",
        parent,
        Arc::new(registry),
        policy,
        settings(5),
    )
}

/// Parent limits far shorter than the sub-agent's run
fn tight_policy() -> SandboxPolicy {
    let mut policy = SandboxPolicy::default();
    policy.tool_timeout = Duration::from_millis(50);
    policy.code_timeout = Duration::from_millis(50);
    policy
}

#[tokio::test]
async fn test_delegated_answer_becomes_observation() {
    let parent = ScriptedModel::new(vec![
        LLMResponse::tool_call(ToolCall::new(
            "search",
            json!({"request": "What does %LINEPROTO-5-UPDOWN mean?"}),
        )),
        LLMResponse::text("Final Answer: interface flapped"),
    ]);
    let child = ScriptedModel::new(vec![LLMResponse::text("Final Answer: X")]);
    let agent = manager(Arc::clone(&parent), Arc::clone(&child), 2);

    let report = agent.run_detailed("explain the syslog line").await;

    assert_eq!(report.outcome.answer(), Some("interface flapped"));
    assert_eq!(report.transcript.steps()[0].observation, "X");

    // the sub-agent got the framed request as its task
    let task = &child.prompt(0)[1].content;
    assert!(task.contains("%LINEPROTO-5-UPDOWN"));
    assert!(task.contains("'search'"));
}

#[tokio::test]
async fn test_sub_agent_step_limit_is_reported_and_parent_continues() {
    let parent = ScriptedModel::new(vec![
        LLMResponse::tool_call(ToolCall::new("search", json!({"request": "find it"}))),
        LLMResponse::text("Final Answer: search gave up"),
    ]);
    let child = ScriptedModel::repeating("I am still looking", 5);
    let agent = manager(Arc::clone(&parent), Arc::clone(&child), 1);

    let report = agent.run_detailed("find it").await;

    assert_eq!(report.outcome.answer(), Some("search gave up"));
    assert_eq!(child.calls(), 2);
    let step = &report.transcript.steps()[0];
    assert!(step.is_error());
    assert!(step
        .observation
        .contains("managed agent 'search' reached its step limit"));
}

#[tokio::test]
async fn test_code_can_call_managed_agent() {
    let parent = ScriptedModel::new(vec![LLMResponse::text(
        "```py\nanswer = search(request=\"latest IOS XE release\")\nfinal_answer(answer.upper())\n```",
    )]);
    let child = ScriptedModel::new(vec![LLMResponse::text("Final Answer: 17.15")]);
    let agent = manager(parent, child, 2);

    let outcome = agent.run("which release?").await;

    assert_eq!(outcome.answer(), Some("17.15"));
}

#[tokio::test]
async fn test_delegated_run_outlasting_tool_timeout_completes() {
    let parent = ScriptedModel::new(vec![
        LLMResponse::tool_call(ToolCall::new("search", json!({"request": "look it up"}))),
        LLMResponse::text("Final Answer: got it"),
    ]);
    let child = ScriptedModel::with_latency(
        vec![
            LLMResponse::text("```py\nprint('thinking')\n```"),
            LLMResponse::text("Final Answer: X"),
        ],
        Duration::from_millis(80),
    );
    let agent = manager_with_policy(parent, Arc::clone(&child), 3, tight_policy());

    let report = agent.run_detailed("look it up").await;

    assert_eq!(report.outcome.answer(), Some("got it"));
    assert_eq!(report.transcript.steps()[0].observation, "X");
    assert_eq!(child.calls(), 2);
}

#[tokio::test]
async fn test_delegated_run_from_code_is_not_cut_by_code_timeout() {
    let parent = ScriptedModel::new(vec![LLMResponse::text(
        "```py\nanswer = search(request=\"look it up\")\nfinal_answer(answer)\n```",
    )]);
    let child = ScriptedModel::with_latency(
        vec![LLMResponse::text("Final Answer: X")],
        Duration::from_millis(120),
    );
    let agent = manager_with_policy(parent, child, 2, tight_policy());

    let outcome = agent.run("look it up").await;

    assert_eq!(outcome.answer(), Some("X"));
}
