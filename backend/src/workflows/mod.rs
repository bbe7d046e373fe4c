// Workflow Automation Engine
//
// Event-driven ticket automation: triggers select workflows, conditions gate
// them, and actions run in order on a bounded worker pool.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod seed;
pub mod templates;
pub mod triggers;

pub use actions::{ActionDispatcher, ActionOutcome};
pub use conditions::ConditionEvaluator;
pub use engine::{DeleteOutcome, WorkflowEngine};
pub use executor::WorkflowExecutor;
pub use pool::{ExecutionPool, ExecutionPoolConfig, OverflowPolicy, PoolStats};
pub use postgres::PgWorkflowRepository;
pub use repository::{
    AgentDirectory, InMemoryAgentDirectory, InMemoryTicketRepository, InMemoryWorkflowRepository, TicketRepository,
    WorkflowRepository,
};
pub use templates::TemplateResolver;
pub use triggers::{EventSource, TriggerEvent};
