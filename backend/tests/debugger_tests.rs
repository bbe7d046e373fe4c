mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;

use common::fixtures::active_workflow;
use common::{TestContext, WAIT};
use ticketflow::debugger::{
    Breakpoint, BreakpointType, ComponentKind, DebugOptions, DebugSession, DebugSessionExport, ScriptedFailures,
    SessionStatus, StepStatus,
};
use ticketflow::error::WorkflowError;
use ticketflow_shared::{Action, Condition, Workflow, WorkflowContext};

fn data(value: Value) -> WorkflowContext {
    match value {
        Value::Object(map) => map,
        _ => WorkflowContext::new(),
    }
}

/// One trigger, one condition on `priority`, two actions.
fn escalation_workflow() -> Workflow {
    active_workflow("escalate", 1)
        .with_condition(Condition::equals("priority", "high"))
        .with_action(Action::change_status("escalated"))
        .with_action(Action::add_tag("urgent"))
}

async fn wait_until<F>(rx: &mut watch::Receiver<DebugSession>, predicate: F) -> DebugSession
where
    F: FnMut(&DebugSession) -> bool,
{
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("session did not reach the expected state")
        .expect("session task went away")
        .clone()
}

fn has_step(session: &DebugSession, component: &str) -> bool {
    session.execution_path.iter().any(|s| s.component_id == component)
}

#[tokio::test]
async fn test_runs_to_completion_with_full_coverage() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let id = debugger
        .start_debug_session(workflow.id, data(json!({ "priority": "high", "tags": ["vip"] })))
        .await
        .unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.execution_path.len(), 4);
    assert!(session.execution_path.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(session.variables.get("new_status"), Some(&json!("escalated")));
    assert_eq!(session.variables.get("tags"), Some(&json!(["vip", "urgent"])));
    assert_eq!(session.variables.get("action_1_executed"), Some(&json!(true)));

    assert_eq!(session.coverage.total_components, 4);
    assert_eq!(session.coverage.executed_components, 4);
    assert_eq!(session.coverage.coverage_percent, 100.0);
    assert_eq!(session.coverage.condition_coverage.get("condition_0"), Some(&true));
    assert!(session.completed_at.is_some());

    // Each step keeps the variables it started with.
    let tag_step = &session.execution_path[3];
    assert_eq!(tag_step.variables.get("new_status"), Some(&json!("escalated")));
    assert!(tag_step.variables.get("action_1_executed").is_none());
}

#[tokio::test]
async fn test_false_condition_ends_run_early() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let id = debugger
        .start_debug_session(workflow.id, data(json!({ "priority": "low" })))
        .await
        .unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(!has_step(&session, "action_0"));
    assert_eq!(session.coverage.executed_components, 2);
    assert_eq!(session.coverage.coverage_percent, 50.0);
    assert_eq!(session.coverage.condition_coverage.get("condition_0"), Some(&false));
    assert!(session.variables.get("new_status").is_none());
}

#[tokio::test]
async fn test_empty_workflow_reports_zero_coverage() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(Workflow::new("empty")).await;
    let debugger = ctx.debugger();

    let id = debugger
        .start_debug_session(workflow.id, WorkflowContext::new())
        .await
        .unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.coverage.total_components, 0);
    assert_eq!(session.coverage.coverage_percent, 0.0);
}

#[tokio::test]
async fn test_trigger_type_filter() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let id = debugger
        .start_debug_session(
            workflow.id,
            data(json!({ "priority": "high", "trigger_type": "manual" })),
        )
        .await
        .unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.execution_path.len(), 1);
    assert_eq!(session.execution_path[0].output, Some(json!({ "fired": false })));
}

#[tokio::test]
async fn test_before_breakpoint_pauses_before_step_is_recorded() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let options = DebugOptions {
        breakpoints: vec![Breakpoint::new("action_1", BreakpointType::Before)],
        step_mode: false,
    };
    let id = debugger
        .start_debug_session_with(workflow.id, data(json!({ "priority": "high" })), options)
        .await
        .unwrap();
    let mut rx = debugger.subscribe(id).await.unwrap();

    let paused = wait_until(&mut rx, |s| s.status == SessionStatus::Paused).await;
    assert_eq!(paused.current_component.as_deref(), Some("action_1"));
    assert!(has_step(&paused, "action_0"));
    assert!(!has_step(&paused, "action_1"));
    assert!(paused.pause_reason.is_some());

    let breakpoints = debugger.list_breakpoints(id).await.unwrap();
    assert_eq!(breakpoints[0].hit_count, 1);

    debugger.resume(id).await.unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(has_step(&session, "action_1"));
    assert_eq!(session.breakpoints[0].hit_count, 1);
}

#[tokio::test]
async fn test_after_breakpoint_pauses_once_step_is_done() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let options = DebugOptions {
        breakpoints: vec![Breakpoint::new("condition_0", BreakpointType::After)],
        step_mode: false,
    };
    let id = debugger
        .start_debug_session_with(workflow.id, data(json!({ "priority": "high" })), options)
        .await
        .unwrap();
    let mut rx = debugger.subscribe(id).await.unwrap();

    let paused = wait_until(&mut rx, |s| s.status == SessionStatus::Paused).await;
    let last = paused.execution_path.last().unwrap();
    assert_eq!(last.component_id, "condition_0");
    assert_eq!(last.status, StepStatus::Completed);

    debugger.resume(id).await.unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_stop_while_paused_fails_session() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let options = DebugOptions {
        breakpoints: vec![Breakpoint::new("action_0", BreakpointType::Before)],
        step_mode: false,
    };
    let id = debugger
        .start_debug_session_with(workflow.id, data(json!({ "priority": "high" })), options)
        .await
        .unwrap();
    let mut rx = debugger.subscribe(id).await.unwrap();
    wait_until(&mut rx, |s| s.status == SessionStatus::Paused).await;

    debugger.stop(id).await.unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.error.as_deref(), Some("stopped"));
    assert!(session.logs.iter().any(|l| l.message.contains("stopped")));
    assert!(!has_step(&session, "action_0"));

    assert!(matches!(debugger.stop(id).await, Err(WorkflowError::InvalidState(_))));
    assert!(matches!(debugger.resume(id).await, Err(WorkflowError::InvalidState(_))));
}

#[tokio::test]
async fn test_step_mode_pauses_before_and_after_every_component() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let options = DebugOptions {
        breakpoints: Vec::new(),
        step_mode: true,
    };
    let id = debugger
        .start_debug_session_with(workflow.id, data(json!({ "priority": "high" })), options)
        .await
        .unwrap();
    let mut rx = debugger.subscribe(id).await.unwrap();

    let mut pauses: Vec<String> = Vec::new();
    loop {
        let last = pauses.last().cloned();
        let session = wait_until(&mut rx, |s| {
            s.status.is_terminal() || (s.status == SessionStatus::Paused && s.pause_reason != last)
        })
        .await;
        if session.status.is_terminal() {
            assert_eq!(session.status, SessionStatus::Completed);
            break;
        }
        pauses.extend(session.pause_reason.clone());
        debugger.resume(id).await.unwrap();
    }

    let expected: Vec<String> = ["trigger_0", "condition_0", "action_0", "action_1"]
        .iter()
        .flat_map(|c| [format!("step before {}", c), format!("step after {}", c)])
        .collect();
    assert_eq!(pauses, expected);
}

#[tokio::test]
async fn test_step_mode_can_be_turned_off_mid_run() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let options = DebugOptions {
        breakpoints: Vec::new(),
        step_mode: true,
    };
    let id = debugger
        .start_debug_session_with(workflow.id, data(json!({ "priority": "high" })), options)
        .await
        .unwrap();
    let mut rx = debugger.subscribe(id).await.unwrap();
    wait_until(&mut rx, |s| s.status == SessionStatus::Paused).await;

    debugger.set_step_mode(id, false).await.unwrap();
    debugger.resume(id).await.unwrap();

    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.execution_path.len(), 4);
}

#[tokio::test]
async fn test_scripted_failure_halts_unless_continue_on_error() {
    let ctx = TestContext::new();
    let hard = ctx.add_workflow(escalation_workflow()).await;
    let soft = ctx
        .add_workflow(
            active_workflow("soft", 1)
                .with_action(Action::change_status("escalated").continue_on_error())
                .with_action(Action::add_tag("urgent")),
        )
        .await;
    let debugger = ctx.debugger();
    let test_data = data(json!({ "priority": "high", "simulate_failures": true, "fail_actions": [0] }));

    let id = debugger.start_debug_session(hard.id, test_data.clone()).await.unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    let failed = session.execution_path.last().unwrap();
    assert_eq!(failed.component_id, "action_0");
    assert_eq!(failed.status, StepStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("change_status"));
    assert!(!has_step(&session, "action_1"));

    let id = debugger.start_debug_session(soft.id, test_data).await.unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.variables.get("action_0_executed").is_none());
    assert_eq!(session.variables.get("action_1_executed"), Some(&json!(true)));
}

#[tokio::test]
async fn test_injector_ignored_without_simulate_flag() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger().with_injector(Arc::new(ScriptedFailures::new([0, 1])));

    let id = debugger
        .start_debug_session(workflow.id, data(json!({ "priority": "high" })))
        .await
        .unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);

    let id = debugger
        .start_debug_session(workflow.id, data(json!({ "priority": "high", "simulate_failures": true })))
        .await
        .unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_error_breakpoint_pauses_on_failure() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let options = DebugOptions {
        breakpoints: vec![Breakpoint::new("action_1", BreakpointType::Error)],
        step_mode: false,
    };
    let test_data = data(json!({ "priority": "high", "simulate_failures": true, "fail_actions": [1] }));
    let id = debugger
        .start_debug_session_with(workflow.id, test_data, options)
        .await
        .unwrap();
    let mut rx = debugger.subscribe(id).await.unwrap();

    let paused = wait_until(&mut rx, |s| s.status == SessionStatus::Paused).await;
    assert_eq!(paused.execution_path.last().unwrap().status, StepStatus::Failed);

    debugger.resume(id).await.unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_breakpoint_management() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let options = DebugOptions {
        breakpoints: vec![Breakpoint::new("trigger_0", BreakpointType::Before)],
        step_mode: false,
    };
    let id = debugger
        .start_debug_session_with(workflow.id, data(json!({ "priority": "high" })), options)
        .await
        .unwrap();
    let mut rx = debugger.subscribe(id).await.unwrap();
    wait_until(&mut rx, |s| s.status == SessionStatus::Paused).await;

    let added = debugger
        .set_breakpoint(id, "action_0", BreakpointType::Before)
        .await
        .unwrap();
    assert_eq!(debugger.list_breakpoints(id).await.unwrap().len(), 2);
    debugger.remove_breakpoint(id, added).await.unwrap();
    assert!(matches!(
        debugger.remove_breakpoint(id, added).await,
        Err(WorkflowError::NotFound(_))
    ));

    debugger.resume(id).await.unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);

    let unknown = uuid::Uuid::new_v4();
    assert!(matches!(
        debugger.set_breakpoint(unknown, "action_0", BreakpointType::Before).await,
        Err(WorkflowError::NotFound(_))
    ));
    assert!(matches!(debugger.get_debug_session(unknown).await, Err(WorkflowError::NotFound(_))));
    assert!(matches!(
        debugger.start_debug_session(unknown, WorkflowContext::new()).await,
        Err(WorkflowError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_sessions_are_listed_and_removed() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let first = debugger
        .start_debug_session(workflow.id, data(json!({ "priority": "high" })))
        .await
        .unwrap();
    let second = debugger
        .start_debug_session(workflow.id, data(json!({ "priority": "low" })))
        .await
        .unwrap();
    debugger.wait_for_completion(first, WAIT).await.unwrap();
    debugger.wait_for_completion(second, WAIT).await.unwrap();

    let ids: Vec<_> = debugger.list_sessions().await.into_iter().map(|s| s.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first) && ids.contains(&second));

    debugger.remove_session(first).await.unwrap();
    assert_eq!(debugger.list_sessions().await.len(), 1);
    assert!(matches!(debugger.get_debug_session(first).await, Err(WorkflowError::NotFound(_))));
    assert!(matches!(debugger.list_breakpoints(first).await, Err(WorkflowError::NotFound(_))));
}

#[tokio::test]
async fn test_export_round_trip_reproduces_summary() {
    let ctx = TestContext::new();
    let workflow = ctx.add_workflow(escalation_workflow()).await;
    let debugger = ctx.debugger();

    let id = debugger
        .start_debug_session(workflow.id, data(json!({ "priority": "high" })))
        .await
        .unwrap();
    let session = debugger.wait_for_completion(id, WAIT).await.unwrap().unwrap();

    let export = debugger.export_session(id).await.unwrap();
    let restored = DebugSessionExport::from_json(&export.to_json().unwrap()).unwrap();
    assert_eq!(restored, export);

    let (coverage, performance) = restored.summarize();
    assert_eq!(coverage, session.coverage);
    assert_eq!(performance, session.performance);
    assert!(restored
        .session
        .execution_path
        .iter()
        .any(|s| s.component_type == ComponentKind::Condition));
}
