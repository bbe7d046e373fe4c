pub mod config;
pub mod database;
pub mod debugger;
pub mod error;
pub mod jobs;
pub mod services;
pub mod validation;
pub mod workflows;

pub use error::{ValidationBuilder, WorkflowError, WorkflowResult};
pub use validation::{validate_workflow, Validated};
