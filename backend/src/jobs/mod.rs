// Background Jobs
//
// Cron schedules that start workflows, driven by tokio-cron-scheduler.

pub mod scheduler;

pub use scheduler::{ScheduledRun, WorkflowScheduler};
