// Workflow Engine - Core workflow processing and management

use std::sync::Arc;

use chrono::Utc;
use ticketflow_shared::{TriggerType, Workflow, WorkflowContext, WorkflowExecution, WorkflowStatus};
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::ActionDispatcher;
use super::executor::WorkflowExecutor;
use super::pool::{ExecutionPool, ExecutionPoolConfig, ExecutionTask, PoolStats};
use super::repository::WorkflowRepository;
use super::triggers::{select_workflows, TriggerEvent};
use crate::error::{WorkflowError, WorkflowResult};
use crate::validation::validate_workflow;

/// Result of [`WorkflowEngine::delete_workflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Execution history references the workflow, so it was archived instead.
    Archived,
}

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowRepository>,
    pool: ExecutionPool,
}

impl WorkflowEngine {
    /// Builds the engine and starts its worker pool on the current runtime.
    pub fn new(workflows: Arc<dyn WorkflowRepository>, dispatcher: ActionDispatcher, pool: ExecutionPoolConfig) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(workflows.clone(), Arc::new(dispatcher)));
        Self {
            workflows,
            pool: ExecutionPool::start(pool, executor),
        }
    }

    pub fn repository(&self) -> Arc<dyn WorkflowRepository> {
        self.workflows.clone()
    }

    /// Queues one execution per active workflow the trigger matches, highest
    /// priority first. Returns the ids of the dispatched workflows in order.
    ///
    /// Action failures never surface here; they are recorded on the
    /// execution. Every matching workflow is attempted even if the queue
    /// rejects one of them.
    pub async fn process_trigger(&self, trigger_type: TriggerType, context: WorkflowContext) -> WorkflowResult<Vec<Uuid>> {
        let active = self
            .workflows
            .get_active_workflows()
            .await
            .map_err(|e| WorkflowError::Dispatch(format!("failed to get active workflows: {}", e)))?;

        let selected = select_workflows(active, trigger_type, &context);
        info!(trigger = %trigger_type, matched = selected.len(), "Processing trigger");

        let total = selected.len();
        let mut dispatched = Vec::with_capacity(total);
        let mut last_error = None;

        for workflow in selected {
            let workflow_id = workflow.id;
            match self
                .pool
                .submit(ExecutionTask::new(workflow, trigger_type, context.clone()))
                .await
            {
                Ok(()) => dispatched.push(workflow_id),
                Err(e) => {
                    warn!(%workflow_id, error = %e, "Failed to dispatch workflow");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(WorkflowError::Dispatch(format!(
                "{} of {} executions dispatched: {}",
                dispatched.len(),
                total,
                e
            ))),
            None => Ok(dispatched),
        }
    }

    pub async fn process_event(&self, event: TriggerEvent) -> WorkflowResult<Vec<Uuid>> {
        self.process_trigger(event.trigger_type, event.context).await
    }

    /// Queues one specific active workflow regardless of its trigger list.
    pub async fn trigger_workflow(
        &self,
        workflow_id: Uuid,
        trigger_type: TriggerType,
        context: WorkflowContext,
    ) -> WorkflowResult<()> {
        let workflow = self.workflows.get_by_id(workflow_id).await?;
        if workflow.status != WorkflowStatus::Active {
            return Err(WorkflowError::InvalidState(format!(
                "workflow {} is {}, not active",
                workflow_id, workflow.status
            )));
        }
        self.pool
            .submit(ExecutionTask::new(workflow, trigger_type, context))
            .await
    }

    /// Stores a new workflow as a draft.
    pub async fn create_workflow(&self, mut workflow: Workflow) -> WorkflowResult<Uuid> {
        workflow.status = WorkflowStatus::Draft;
        workflow.created_at = Utc::now();
        workflow.updated_at = None;
        workflow.run_count = 0;
        workflow.error_count = 0;
        workflow.last_run_at = None;

        let workflow = validate_workflow(workflow)?.into_inner();
        self.workflows.create(&workflow).await?;

        info!(workflow_id = %workflow.id, "Created workflow '{}'", workflow.name);
        Ok(workflow.id)
    }

    /// Replaces the definition of an existing workflow. Status and run
    /// statistics are kept.
    pub async fn update_workflow(&self, id: Uuid, mut workflow: Workflow) -> WorkflowResult<()> {
        let existing = self.workflows.get_by_id(id).await?;
        if existing.is_system {
            return Err(WorkflowError::Forbidden("system workflows cannot be modified".to_string()));
        }

        workflow.id = id;
        workflow.is_system = false;
        workflow.status = existing.status;
        workflow.created_at = existing.created_at;
        workflow.created_by = existing.created_by;
        workflow.updated_at = Some(Utc::now());

        let workflow = validate_workflow(workflow)?.into_inner();
        self.workflows.update(&workflow).await?;

        info!(workflow_id = %id, "Updated workflow");
        Ok(())
    }

    pub async fn delete_workflow(&self, id: Uuid) -> WorkflowResult<DeleteOutcome> {
        let mut workflow = self.workflows.get_by_id(id).await?;
        if workflow.is_system {
            return Err(WorkflowError::Forbidden("system workflows cannot be deleted".to_string()));
        }

        if !self.workflows.list_executions(Some(id), 1).await?.is_empty() {
            workflow.status = WorkflowStatus::Archived;
            workflow.updated_at = Some(Utc::now());
            self.workflows.update(&workflow).await?;
            info!(workflow_id = %id, "Workflow has execution history, archived instead of deleted");
            return Ok(DeleteOutcome::Archived);
        }

        self.workflows.delete(id).await?;
        info!(workflow_id = %id, "Deleted workflow");
        Ok(DeleteOutcome::Deleted)
    }

    pub async fn activate_workflow(&self, id: Uuid) -> WorkflowResult<()> {
        self.set_status(id, WorkflowStatus::Active).await
    }

    pub async fn deactivate_workflow(&self, id: Uuid) -> WorkflowResult<()> {
        self.set_status(id, WorkflowStatus::Inactive).await
    }

    pub async fn archive_workflow(&self, id: Uuid) -> WorkflowResult<()> {
        self.set_status(id, WorkflowStatus::Archived).await
    }

    async fn set_status(&self, id: Uuid, status: WorkflowStatus) -> WorkflowResult<()> {
        let mut workflow = self.workflows.get_by_id(id).await?;
        if workflow.status == WorkflowStatus::Archived && status == WorkflowStatus::Active {
            return Err(WorkflowError::InvalidState(format!("workflow {} is archived", id)));
        }
        workflow.status = status;
        workflow.updated_at = Some(Utc::now());
        self.workflows.update(&workflow).await?;

        info!(workflow_id = %id, %status, "Workflow status changed");
        Ok(())
    }

    pub async fn get_workflow(&self, id: Uuid) -> WorkflowResult<Workflow> {
        self.workflows.get_by_id(id).await
    }

    pub async fn list_workflows(&self) -> WorkflowResult<Vec<Workflow>> {
        self.workflows.list().await
    }

    /// Newest executions first.
    pub async fn execution_history(&self, workflow_id: Option<Uuid>, limit: usize) -> WorkflowResult<Vec<WorkflowExecution>> {
        self.workflows.list_executions(workflow_id, limit).await
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stops accepting triggers and waits for queued executions to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
