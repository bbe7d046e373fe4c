//! Error taxonomy shared by the engine, the dispatcher and the debugger.
//!
//! Validation, not-found and dispatch errors are returned to callers. Action
//! errors are captured into execution logs by the owning worker and never
//! propagate past it.

use std::collections::HashMap;

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed workflow definition, rejected before persistence.
    #[error("Validation failed: {}", describe_details(.details))]
    Validation { details: HashMap<String, Vec<String>> },

    #[error("{0} not found")]
    NotFound(String),

    /// Action config decode failure or a missing/mistyped key.
    #[error("Invalid action config: {0}")]
    ActionConfig(String),

    /// A collaborator failed while running an action.
    #[error("Action failed: {0}")]
    ActionExecution(String),

    /// Trigger processing itself failed.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

fn describe_details(details: &HashMap<String, Vec<String>>) -> String {
    let mut fields: Vec<_> = details.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
        .into_iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl WorkflowError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} {}", kind, id))
    }

    pub fn validation_single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert(field.into(), vec![message.into()]);
        Self::Validation { details }
    }

    /// Stable machine-readable code, used in logs and the binary's output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ActionConfig(_) => "ACTION_CONFIG_ERROR",
            Self::ActionExecution(_) => "ACTION_EXECUTION_ERROR",
            Self::Dispatch(_) => "DISPATCH_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Scheduler(_) => "SCHEDULER_ERROR",
        }
    }
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        Self::ActionExecution(format!("HTTP request failed: {}", err))
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Accumulates field-level validation messages.
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: HashMap::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.push(field, message);
        self
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn build(self) -> Option<WorkflowError> {
        if self.details.is_empty() {
            None
        } else {
            Some(WorkflowError::Validation {
                details: self.details,
            })
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.details.is_empty()
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
