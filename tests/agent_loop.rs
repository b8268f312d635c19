//! End-to-end runs of the step engine against a scripted model

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{settings, ScriptedModel};
use netpilot::agent::{Action, Agent, RunOutcome};
use netpilot::core::{NetpilotError, ParamType, ToolCall, ToolSpec};
use netpilot::llm::LLMResponse;
use netpilot::sandbox::SandboxPolicy;
use netpilot::tools::{FnTool, ToolRegistry};
use serde_json::json;

fn ping_registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolSpec::new("ping", "Pings a host from the agent")
                .param("ip", ParamType::String, "Host to ping"),
            Arc::new(FnTool::new(&["ip"], move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("reachable"))
                }
            })),
        )
        .unwrap();
    registry
        .register(
            ToolSpec::new("reload", "Always fails"),
            Arc::new(FnTool::new(&[], |_| async {
                Err::<serde_json::Value, _>(NetpilotError::device("connection reset by peer"))
            })),
        )
        .unwrap();
    registry
}

fn agent(model: Arc<ScriptedModel>, max_steps: usize) -> (Agent, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = Agent::new(
        "netpilot",
        model,
        Arc::new(ping_registry(Arc::clone(&calls))),
        SandboxPolicy::default(),
        settings(max_steps),
    );
    (agent, calls)
}

#[tokio::test]
async fn test_tool_call_then_final_answer() {
    let model = ScriptedModel::new(vec![
        LLMResponse::tool_call(ToolCall::new("ping", json!({"ip": "8.8.8.8"}))),
        LLMResponse::text("Final Answer: done"),
    ]);
    let (agent, calls) = agent(Arc::clone(&model), 5);

    let report = agent.run_detailed("Can you ping 8.8.8.8?").await;

    assert_eq!(report.outcome.answer(), Some("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.transcript.len(), 1);
    let step = &report.transcript.steps()[0];
    assert_eq!(step.index, 1);
    assert_eq!(step.observation, "reachable");
    assert!(matches!(&step.action, Action::ToolCall(call) if call.name == "ping"));

    // the second model call saw the observation
    assert_eq!(model.calls(), 2);
    let second = model.prompt(1);
    assert_eq!(second.last().unwrap().content, "Observation (step 1):\nreachable");
}

#[tokio::test]
async fn test_step_limit_hits_one_past_max_steps() {
    let responses = (0..10)
        .map(|_| LLMResponse::tool_call(ToolCall::new("ping", json!({"ip": "10.0.0.1"}))))
        .collect();
    let model = ScriptedModel::new(responses);
    let (agent, calls) = agent(Arc::clone(&model), 3);

    let report = agent.run_detailed("keep pinging").await;

    match &report.outcome {
        RunOutcome::StepLimitExceeded(steps) => assert_eq!(steps.len(), 4),
        other => panic!("expected step limit, got {:?}", other),
    }
    assert_eq!(report.transcript.len(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(model.calls(), 4);
}

#[tokio::test]
async fn test_malformed_output_counts_toward_step_limit() {
    let model = ScriptedModel::repeating("I will check the router now", 10);
    let (agent, _) = agent(Arc::clone(&model), 3);

    let report = agent.run_detailed("check r1").await;

    assert!(matches!(report.outcome, RunOutcome::StepLimitExceeded(_)));
    assert_eq!(report.transcript.len(), 4);
    assert!(report.transcript.steps().iter().all(|s| s.is_error()));
}

#[tokio::test]
async fn test_disallowed_import_is_observed_and_run_continues() {
    let model = ScriptedModel::new(vec![
        LLMResponse::text("```py\nimport os\nprint(os.listdir('.'))\n```"),
        LLMResponse::text("```py\nimport re\nm = re.search(r'(\\d+) ms', 'rtt 12 ms')\nprint(m.group(1))\n```"),
        LLMResponse::text("Final Answer: 12"),
    ]);
    let (agent, _) = agent(model, 5);

    let report = agent.run_detailed("measure rtt").await;

    assert_eq!(report.outcome.answer(), Some("12"));
    let steps = report.transcript.steps();
    assert_eq!(steps.len(), 2);
    assert!(steps[0].is_error());
    assert!(steps[0]
        .observation
        .starts_with("Error: Import of module 'os' is not allowed"));
    assert!(!steps[1].is_error());
    assert!(steps[1].observation.starts_with("Execution logs:\n12\n"));
}

#[tokio::test]
async fn test_raising_tool_adds_one_error_step() {
    let model = ScriptedModel::new(vec![
        LLMResponse::tool_call(ToolCall::new("reload", json!({}))),
        LLMResponse::text("Final Answer: the device refused"),
    ]);
    let (agent, _) = agent(model, 5);

    let report = agent.run_detailed("reload r1").await;

    assert_eq!(report.outcome.answer(), Some("the device refused"));
    assert_eq!(report.transcript.len(), 1);
    let step = &report.transcript.steps()[0];
    assert!(step.is_error());
    assert!(step.observation.starts_with("Error: Tool execution error"));
    assert!(step.observation.contains("connection reset by peer"));
}

#[tokio::test]
async fn test_code_calls_tools_and_finishes() {
    let model = ScriptedModel::new(vec![LLMResponse::text(
        "Thought: ping both hosts.\n```py\nresults = {}\nfor ip in ['10.0.0.1', '10.0.0.2']:\n    results[ip] = ping(ip=ip)\nfinal_answer(f\"{len(results)} hosts {results['10.0.0.2']}\")\n```",
    )]);
    let (agent, calls) = agent(model, 5);

    let report = agent.run_detailed("ping both").await;

    assert_eq!(report.outcome.answer(), Some("2 hosts reachable"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.transcript.len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_is_an_observation() {
    let model = ScriptedModel::new(vec![
        LLMResponse::text(r#"{"name": "traceroute", "arguments": {"ip": "1.1.1.1"}}"#),
        LLMResponse::text("Final Answer: cannot traceroute"),
    ]);
    let (agent, _) = agent(model, 5);

    let report = agent.run_detailed("traceroute 1.1.1.1").await;

    assert!(report.outcome.is_completed());
    let step = &report.transcript.steps()[0];
    assert!(step.observation.starts_with("Error: Unknown tool 'traceroute'"));
    assert!(step.observation.contains("ping"));
}

#[tokio::test]
async fn test_backend_down_fails_run() {
    let model = ScriptedModel::new(vec![]);
    let (agent, _) = agent(model, 5);

    let outcome = agent.run("anything").await;

    assert!(matches!(outcome, RunOutcome::Failed(NetpilotError::ModelBackend(_))));
}

#[tokio::test]
async fn test_code_scope_does_not_survive_steps() {
    let model = ScriptedModel::new(vec![
        LLMResponse::text("```py\nhost = '10.0.0.1'\n```"),
        LLMResponse::text("```py\nprint(host)\n```"),
        LLMResponse::text("Final Answer: gone"),
    ]);
    let (agent, _) = agent(model, 5);

    let report = agent.run_detailed("remember a host").await;

    let steps = report.transcript.steps();
    assert_eq!(steps.len(), 2);
    assert!(!steps[0].is_error());
    assert!(steps[1].observation.contains("Name 'host' is not defined"));
}
