// Workflow Storage - Postgres-backed workflow repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use ticketflow_shared::{
    Action, Condition, ExecutionStatus, Trigger, TriggerType, Workflow, WorkflowExecution, WorkflowExecutionEntry,
    WorkflowStatus,
};
use uuid::Uuid;

use super::repository::WorkflowRepository;
use crate::error::{WorkflowError, WorkflowResult};

const WORKFLOW_COLUMNS: &str = r#"
    id, name, description, status, priority, is_system, triggers, conditions, actions,
    tags, created_by, created_at, updated_at, last_run_at, run_count, error_count
"#;

const EXECUTION_COLUMNS: &str = r#"
    id, workflow_id, workflow_name, ticket_id, trigger_type, status, started_at, completed_at,
    actions_run, actions_failed, execution_log, error_message
"#;

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    status: WorkflowStatus,
    priority: i32,
    is_system: bool,
    triggers: Json<Vec<Trigger>>,
    conditions: Json<Vec<Condition>>,
    actions: Json<Vec<Action>>,
    tags: Vec<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
    run_count: i64,
    error_count: i64,
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Workflow {
            id: row.id,
            name: row.name,
            description: row.description,
            status: row.status,
            priority: row.priority,
            is_system: row.is_system,
            triggers: row.triggers.0,
            conditions: row.conditions.0,
            actions: row.actions.0,
            tags: row.tags,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_run_at: row.last_run_at,
            run_count: row.run_count,
            error_count: row.error_count,
        }
    }
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_id: Uuid,
    workflow_name: String,
    ticket_id: Option<Uuid>,
    trigger_type: String,
    status: ExecutionStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    actions_run: i32,
    actions_failed: i32,
    execution_log: Json<Vec<WorkflowExecutionEntry>>,
    error_message: Option<String>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = WorkflowError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let trigger_type: TriggerType = row.trigger_type.parse().map_err(WorkflowError::Storage)?;
        Ok(WorkflowExecution {
            id: row.id,
            workflow_id: row.workflow_id,
            workflow_name: row.workflow_name,
            ticket_id: row.ticket_id,
            trigger_type,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            actions_run: row.actions_run.max(0) as u32,
            actions_failed: row.actions_failed.max(0) as u32,
            execution_log: row.execution_log.0,
            error_message: row.error_message,
        })
    }
}

pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn get_active_workflows(&self) -> WorkflowResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows WHERE status = 'active' ORDER BY seq ASC",
            WORKFLOW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Workflow::from).collect())
    }

    async fn get_by_id(&self, id: Uuid) -> WorkflowResult<Workflow> {
        sqlx::query_as::<_, WorkflowRow>(&format!("SELECT {} FROM workflows WHERE id = $1", WORKFLOW_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Workflow::from)
            .ok_or_else(|| WorkflowError::not_found("Workflow", id))
    }

    async fn list(&self) -> WorkflowResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows ORDER BY seq ASC",
            WORKFLOW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Workflow::from).collect())
    }

    async fn create(&self, workflow: &Workflow) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows
            (id, name, description, status, priority, is_system, triggers, conditions, actions,
             tags, created_by, created_at, updated_at, last_run_at, run_count, error_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.status)
        .bind(workflow.priority)
        .bind(workflow.is_system)
        .bind(Json(&workflow.triggers))
        .bind(Json(&workflow.conditions))
        .bind(Json(&workflow.actions))
        .bind(&workflow.tags)
        .bind(workflow.created_by)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .bind(workflow.last_run_at)
        .bind(workflow.run_count)
        .bind(workflow.error_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> WorkflowResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET name = $2, description = $3, status = $4, priority = $5, is_system = $6,
                triggers = $7, conditions = $8, actions = $9, tags = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.status)
        .bind(workflow.priority)
        .bind(workflow.is_system)
        .bind(Json(&workflow.triggers))
        .bind(Json(&workflow.conditions))
        .bind(Json(&workflow.actions))
        .bind(&workflow.tags)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::not_found("Workflow", workflow.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> WorkflowResult<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::not_found("Workflow", id));
        }
        Ok(())
    }

    async fn record_run(&self, id: Uuid, ran_at: DateTime<Utc>, failed: bool) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            UPDATE workflows
            SET run_count = run_count + 1,
                error_count = error_count + CASE WHEN $3 THEN 1 ELSE 0 END,
                last_run_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ran_at)
        .bind(failed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
            (id, workflow_id, workflow_name, ticket_id, trigger_type, status, started_at, completed_at,
             actions_run, actions_failed, execution_log, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(&execution.workflow_name)
        .bind(execution.ticket_id)
        .bind(execution.trigger_type.as_str())
        .bind(execution.status)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.actions_run as i32)
        .bind(execution.actions_failed as i32)
        .bind(Json(&execution.execution_log))
        .bind(&execution.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, completed_at = $3, actions_run = $4, actions_failed = $5,
                execution_log = $6, error_message = $7
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status)
        .bind(execution.completed_at)
        .bind(execution.actions_run as i32)
        .bind(execution.actions_failed as i32)
        .bind(Json(&execution.execution_log))
        .bind(&execution.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_executions(&self, workflow_id: Option<Uuid>, limit: usize) -> WorkflowResult<Vec<WorkflowExecution>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match workflow_id {
            Some(id) => {
                sqlx::query_as::<_, ExecutionRow>(&format!(
                    "SELECT {} FROM workflow_executions WHERE workflow_id = $1 ORDER BY started_at DESC LIMIT $2",
                    EXECUTION_COLUMNS
                ))
                .bind(id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ExecutionRow>(&format!(
                    "SELECT {} FROM workflow_executions ORDER BY started_at DESC LIMIT $1",
                    EXECUTION_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(WorkflowExecution::try_from).collect()
    }
}
