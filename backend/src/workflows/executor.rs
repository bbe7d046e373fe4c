// Workflow Executor - runs one workflow's action sequence and records the outcome

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ticketflow_shared::{ExecutionStatus, TriggerType, Workflow, WorkflowContext, WorkflowExecution};
use tracing::{debug, info, warn};

use super::actions::{context_ticket_id, ActionDispatcher};
use super::conditions::ConditionEvaluator;
use super::repository::WorkflowRepository;

pub struct WorkflowExecutor {
    workflows: Arc<dyn WorkflowRepository>,
    dispatcher: Arc<ActionDispatcher>,
}

impl WorkflowExecutor {
    pub fn new(workflows: Arc<dyn WorkflowRepository>, dispatcher: Arc<ActionDispatcher>) -> Self {
        Self { workflows, dispatcher }
    }

    /// Runs the workflow against the context.
    ///
    /// Returns `None` when a condition gates the run, in which case nothing
    /// is recorded. Action failures end up in the returned record; storage
    /// failures are logged and do not stop the run.
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
        trigger_type: TriggerType,
        context: &WorkflowContext,
    ) -> Option<WorkflowExecution> {
        if let Err(index) = ConditionEvaluator::evaluate_all(&workflow.conditions, context) {
            debug!(
                workflow_id = %workflow.id,
                condition = index,
                "Workflow conditions not met, skipping actions"
            );
            return None;
        }

        let mut execution = WorkflowExecution::start(workflow, trigger_type, context_ticket_id(context));
        if let Err(e) = self.workflows.create_execution(&execution).await {
            warn!(execution_id = %execution.id, error = %e, "Failed to persist execution record");
        }

        info!(
            workflow_id = %workflow.id,
            execution_id = %execution.id,
            "Executing workflow '{}' ({} actions)",
            workflow.name,
            workflow.actions.len()
        );

        for action in &workflow.actions {
            if action.delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(u64::from(action.delay_seconds))).await;
            }

            let started = Instant::now();
            let result = self.dispatcher.dispatch(action, context).await;
            let duration_ms = started.elapsed().as_millis() as i64;

            match result {
                Ok(outcome) => {
                    debug!(action_id = %action.id, "{}", outcome.message);
                    execution.record_success(
                        action,
                        duration_ms,
                        format!("Action {} executed successfully: {}", action.action_type(), outcome.message),
                    );
                }
                Err(e) => {
                    warn!(
                        execution_id = %execution.id,
                        action_id = %action.id,
                        action_type = %action.action_type(),
                        error = %e,
                        "Workflow action failed"
                    );
                    execution.record_failure(action, duration_ms, e.to_string());
                    if !action.continue_on_error {
                        execution.fail(format!("Action {} failed: {}", action.action_type(), e));
                        break;
                    }
                }
            }
        }

        let completed_at = Utc::now();
        execution.finalize(completed_at);

        if let Err(e) = self
            .workflows
            .record_run(workflow.id, completed_at, execution.status == ExecutionStatus::Failed)
            .await
        {
            warn!(workflow_id = %workflow.id, error = %e, "Failed to update workflow statistics");
        }
        if let Err(e) = self.workflows.update_execution(&execution).await {
            warn!(execution_id = %execution.id, error = %e, "Failed to persist execution result");
        }

        info!(
            workflow_id = %workflow.id,
            execution_id = %execution.id,
            status = ?execution.status,
            actions_run = execution.actions_run,
            actions_failed = execution.actions_failed,
            "Workflow execution finished"
        );

        Some(execution)
    }
}
