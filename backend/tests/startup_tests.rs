mod common;

use std::io::Write;
use std::sync::Arc;

use serde_json::json;
use tempfile::NamedTempFile;
use uuid::Uuid;

use common::fixtures::{self, draft_definition};
use common::TestContext;
use ticketflow::error::WorkflowError;
use ticketflow::jobs::WorkflowScheduler;
use ticketflow::workflows::{seed, AgentDirectory, OverflowPolicy, TicketRepository, WorkflowRepository};
use ticketflow_shared::{Action, ExecutionStatus, TriggerType, Workflow, WorkflowSchedule, WorkflowStatus};

fn json_file(value: serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(value.to_string().as_bytes())
        .expect("Failed to write temp file");
    file
}

fn schedule(cron: &str, active: bool) -> WorkflowSchedule {
    serde_json::from_value(json!({
        "workflow_id": Uuid::new_v4(),
        "cron_expression": cron,
        "is_active": active
    }))
    .unwrap()
}

#[tokio::test]
async fn test_seed_creates_new_workflows_and_skips_existing() {
    let ctx = TestContext::new();
    let existing = ctx.add_workflow(draft_definition()).await;
    let fresh = draft_definition().with_status(WorkflowStatus::Active);

    let mut renamed = existing.clone();
    renamed.name = "renamed".to_string();
    let file = json_file(json!([renamed, fresh]));

    let created = seed::seed_workflows(ctx.workflows.as_ref(), file.path()).await.unwrap();

    assert_eq!(created, 1);
    let stored = ctx.workflows.get_by_id(existing.id).await.unwrap();
    assert_eq!(stored.name, existing.name);
    let seeded = ctx.workflows.get_by_id(fresh.id).await.unwrap();
    assert_eq!(seeded.status, WorkflowStatus::Active);
    assert_eq!(ctx.workflows.get_active_workflows().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_seed_rejects_invalid_definitions() {
    let ctx = TestContext::new();
    let file = json_file(json!([Workflow::new("")]));

    let result = seed::seed_workflows(ctx.workflows.as_ref(), file.path()).await;

    assert!(matches!(result, Err(WorkflowError::Validation { .. })));
    assert!(ctx.workflows.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_seed_reports_unreadable_files() {
    let ctx = TestContext::new();
    let missing = std::env::temp_dir().join(format!("missing-{}.json", Uuid::new_v4()));
    let garbage = json_file(json!({ "not": "a list" }));

    assert!(matches!(
        seed::seed_workflows(ctx.workflows.as_ref(), &missing).await,
        Err(WorkflowError::Storage(_))
    ));
    assert!(matches!(
        seed::seed_workflows(ctx.workflows.as_ref(), garbage.path()).await,
        Err(WorkflowError::Storage(_))
    ));
}

#[tokio::test]
async fn test_load_schedules_accepts_either_cron_key() {
    let workflow_id = Uuid::new_v4();
    let file = json_file(json!([
        { "workflow_id": workflow_id, "cron_expr": "0 0 9 * * *" },
        { "workflow_id": workflow_id, "cron_expression": "0 30 * * * *", "is_active": false }
    ]));

    let schedules = seed::load_schedules(file.path()).await.unwrap();

    assert_eq!(schedules.len(), 2);
    assert!(schedules[0].is_active);
    assert_eq!(schedules[1].cron_expr, "0 30 * * * *");
    assert!(!schedules[1].is_active);
}

#[tokio::test]
async fn test_scheduler_registration() {
    let ctx = TestContext::new();
    let engine = Arc::new(ctx.engine(1, 4, OverflowPolicy::Reject));
    let scheduler = WorkflowScheduler::new(engine.clone()).await.unwrap();

    let registered = scheduler.register(&schedule("0 0 9 * * *", true)).await.unwrap();
    assert!(registered.is_some());

    let skipped = scheduler.register(&schedule("not a cron", false)).await.unwrap();
    assert!(skipped.is_none());

    assert!(matches!(
        scheduler.register(&schedule("not a cron", true)).await,
        Err(WorkflowError::Scheduler(_))
    ));
    assert!(scheduler.recent_runs().await.is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_tickets_and_agents_load_from_files() {
    let ctx = TestContext::new();
    let ticket = fixtures::ticket();
    let group_id = Uuid::new_v4();
    let agent = fixtures::agent(2, &["network"]);

    let tickets_file = json_file(json!([ticket]));
    let agents_file = json_file(json!({ group_id.to_string(): [agent] }));

    assert_eq!(seed::seed_tickets(&ctx.tickets, tickets_file.path()).await.unwrap(), 1);
    assert_eq!(seed::seed_agents(&ctx.agents, agents_file.path()).await.unwrap(), 1);

    assert_eq!(ctx.tickets.get_by_id(ticket.id).await.unwrap(), ticket);
    assert_eq!(ctx.agents.group_members(group_id).await.unwrap(), vec![agent]);
}

#[tokio::test]
async fn test_seeded_ticket_is_visible_to_actions() {
    let ctx = TestContext::new();
    let ticket = fixtures::ticket();
    let file = json_file(json!([ticket]));
    seed::seed_tickets(&ctx.tickets, file.path()).await.unwrap();

    let workflow = ctx
        .add_workflow(fixtures::active_workflow("tag", 1).with_action(Action::add_tag("seeded")))
        .await;
    let execution = ctx
        .executor()
        .execute_workflow(&workflow, TriggerType::TicketCreated, &fixtures::ticket_context(&ticket))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(ctx.tickets.get_by_id(ticket.id).await.unwrap().tags, vec!["seeded".to_string()]);
}
