// Workflow Repositories - storage contracts and in-memory implementations

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ticketflow_shared::{Agent, Ticket, Workflow, WorkflowExecution, WorkflowStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Active workflows in storage order.
    async fn get_active_workflows(&self) -> WorkflowResult<Vec<Workflow>>;
    async fn get_by_id(&self, id: Uuid) -> WorkflowResult<Workflow>;
    async fn list(&self) -> WorkflowResult<Vec<Workflow>>;
    async fn create(&self, workflow: &Workflow) -> WorkflowResult<()>;
    /// Replaces the definition. Run stats are left to `record_run`.
    async fn update(&self, workflow: &Workflow) -> WorkflowResult<()>;
    async fn delete(&self, id: Uuid) -> WorkflowResult<()>;
    /// Bumps run statistics after an execution finishes.
    async fn record_run(&self, id: Uuid, ran_at: DateTime<Utc>, failed: bool) -> WorkflowResult<()>;
    async fn create_execution(&self, execution: &WorkflowExecution) -> WorkflowResult<()>;
    async fn update_execution(&self, execution: &WorkflowExecution) -> WorkflowResult<()>;
    /// Newest first.
    async fn list_executions(&self, workflow_id: Option<Uuid>, limit: usize) -> WorkflowResult<Vec<WorkflowExecution>>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> WorkflowResult<Ticket>;
    async fn update(&self, ticket: &Ticket) -> WorkflowResult<()>;
}

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn group_members(&self, group_id: Uuid) -> WorkflowResult<Vec<Agent>>;
}

/// Keeps workflows in insertion order.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<Vec<Workflow>>,
    executions: RwLock<Vec<WorkflowExecution>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn executions(&self) -> Vec<WorkflowExecution> {
        self.executions.read().await.clone()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get_active_workflows(&self) -> WorkflowResult<Vec<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .iter()
            .filter(|w| w.status == WorkflowStatus::Active)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> WorkflowResult<Workflow> {
        self.workflows
            .read()
            .await
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("Workflow", id))
    }

    async fn list(&self) -> WorkflowResult<Vec<Workflow>> {
        Ok(self.workflows.read().await.clone())
    }

    async fn create(&self, workflow: &Workflow) -> WorkflowResult<()> {
        let mut workflows = self.workflows.write().await;
        if workflows.iter().any(|w| w.id == workflow.id) {
            return Err(WorkflowError::Storage(format!("workflow {} already exists", workflow.id)));
        }
        workflows.push(workflow.clone());
        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> WorkflowResult<()> {
        let mut workflows = self.workflows.write().await;
        let slot = workflows
            .iter_mut()
            .find(|w| w.id == workflow.id)
            .ok_or_else(|| WorkflowError::not_found("Workflow", workflow.id))?;
        // Run stats belong to record_run; a caller's copy may be stale.
        let mut updated = workflow.clone();
        updated.run_count = slot.run_count;
        updated.error_count = slot.error_count;
        updated.last_run_at = slot.last_run_at;
        *slot = updated;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> WorkflowResult<()> {
        let mut workflows = self.workflows.write().await;
        let before = workflows.len();
        workflows.retain(|w| w.id != id);
        if workflows.len() == before {
            return Err(WorkflowError::not_found("Workflow", id));
        }
        Ok(())
    }

    async fn record_run(&self, id: Uuid, ran_at: DateTime<Utc>, failed: bool) -> WorkflowResult<()> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| WorkflowError::not_found("Workflow", id))?;
        workflow.run_count += 1;
        if failed {
            workflow.error_count += 1;
        }
        workflow.last_run_at = Some(ran_at);
        Ok(())
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> WorkflowResult<()> {
        self.executions.write().await.push(execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> WorkflowResult<()> {
        let mut executions = self.executions.write().await;
        let slot = executions
            .iter_mut()
            .find(|e| e.id == execution.id)
            .ok_or_else(|| WorkflowError::not_found("Execution", execution.id))?;
        *slot = execution.clone();
        Ok(())
    }

    async fn list_executions(&self, workflow_id: Option<Uuid>, limit: usize) -> WorkflowResult<Vec<WorkflowExecution>> {
        Ok(self
            .executions
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| workflow_id.is_none_or(|id| e.workflow_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
}

impl InMemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, ticket: Ticket) {
        self.tickets.write().await.insert(ticket.id, ticket);
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn get_by_id(&self, id: Uuid) -> WorkflowResult<Ticket> {
        self.tickets
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("Ticket", id))
    }

    async fn update(&self, ticket: &Ticket) -> WorkflowResult<()> {
        let mut tickets = self.tickets.write().await;
        match tickets.get_mut(&ticket.id) {
            Some(slot) => {
                *slot = ticket.clone();
                Ok(())
            }
            None => Err(WorkflowError::not_found("Ticket", ticket.id)),
        }
    }
}

#[derive(Default)]
pub struct InMemoryAgentDirectory {
    groups: RwLock<HashMap<Uuid, Vec<Agent>>>,
}

impl InMemoryAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_group(&self, group_id: Uuid, agents: Vec<Agent>) {
        self.groups.write().await.insert(group_id, agents);
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn group_members(&self, group_id: Uuid) -> WorkflowResult<Vec<Agent>> {
        self.groups
            .read()
            .await
            .get(&group_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("Group", group_id))
    }
}
