// Common test utilities that are shared across integration tests
#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

use std::sync::{Arc, Once};
use std::time::Duration;

use ticketflow::debugger::{DebugConfig, DebugController};
use ticketflow::services::{EmailService, NotificationService};
use ticketflow::workflows::{
    ActionDispatcher, ExecutionPoolConfig, InMemoryAgentDirectory, InMemoryTicketRepository,
    InMemoryWorkflowRepository, OverflowPolicy, WorkflowEngine, WorkflowExecutor, WorkflowRepository,
};
use ticketflow_shared::{Ticket, Workflow, WorkflowExecution};

use fakes::{RecordingEmail, RecordingNotifications};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

/// In-memory collaborators wired the way the binary wires them.
pub struct TestContext {
    pub workflows: Arc<InMemoryWorkflowRepository>,
    pub tickets: Arc<InMemoryTicketRepository>,
    pub agents: Arc<InMemoryAgentDirectory>,
    pub email: Arc<RecordingEmail>,
    pub notifications: Arc<RecordingNotifications>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_email(RecordingEmail::new())
    }

    pub fn with_email(email: RecordingEmail) -> Self {
        init_test_logging();
        Self {
            workflows: Arc::new(InMemoryWorkflowRepository::new()),
            tickets: Arc::new(InMemoryTicketRepository::new()),
            agents: Arc::new(InMemoryAgentDirectory::new()),
            email: Arc::new(email),
            notifications: Arc::new(RecordingNotifications::new()),
        }
    }

    pub fn dispatcher(&self) -> ActionDispatcher {
        self.dispatcher_with_email(self.email.clone())
    }

    pub fn dispatcher_with_email(&self, email: Arc<dyn EmailService>) -> ActionDispatcher {
        let notifications: Arc<dyn NotificationService> = self.notifications.clone();
        ActionDispatcher::new(self.tickets.clone(), self.agents.clone(), email, notifications)
    }

    pub fn executor(&self) -> WorkflowExecutor {
        WorkflowExecutor::new(self.workflows.clone(), Arc::new(self.dispatcher()))
    }

    pub fn executor_with_email(&self, email: Arc<dyn EmailService>) -> WorkflowExecutor {
        WorkflowExecutor::new(self.workflows.clone(), Arc::new(self.dispatcher_with_email(email)))
    }

    pub fn engine(&self, workers: usize, queue_capacity: usize, overflow: OverflowPolicy) -> WorkflowEngine {
        WorkflowEngine::new(
            self.workflows.clone(),
            self.dispatcher(),
            ExecutionPoolConfig {
                workers,
                queue_capacity,
                overflow,
            },
        )
    }

    pub fn debugger(&self) -> DebugController {
        DebugController::new(self.workflows.clone(), DebugConfig::default())
    }

    /// Stores a workflow as-is, bypassing validation and the draft rule.
    pub async fn add_workflow(&self, workflow: Workflow) -> Workflow {
        self.workflows
            .create(&workflow)
            .await
            .expect("Failed to store workflow");
        workflow
    }

    pub async fn add_ticket(&self) -> Ticket {
        let ticket = fixtures::ticket();
        self.tickets.insert(ticket.clone()).await;
        ticket
    }

    pub async fn executions_for(&self, workflow: &Workflow) -> Vec<WorkflowExecution> {
        self.workflows
            .executions()
            .await
            .into_iter()
            .filter(|e| e.workflow_id == workflow.id)
            .collect()
    }
}

pub const WAIT: Duration = Duration::from_secs(5);
