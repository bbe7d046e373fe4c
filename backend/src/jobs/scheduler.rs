// Workflow Scheduler - cron-driven workflow runs

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticketflow_shared::{TriggerType, WorkflowSchedule};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::WorkflowResult;
use crate::workflows::triggers::TriggerEvent;
use crate::workflows::WorkflowEngine;

const RUN_LOG_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRun {
    pub schedule_id: Uuid,
    pub workflow_id: Uuid,
    pub fired_at: DateTime<Utc>,
    pub error: Option<String>,
}

pub struct WorkflowScheduler {
    scheduler: JobScheduler,
    engine: Arc<WorkflowEngine>,
    runs: Arc<RwLock<VecDeque<ScheduledRun>>>,
}

impl WorkflowScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>) -> WorkflowResult<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            engine,
            runs: Arc::new(RwLock::new(VecDeque::new())),
        })
    }

    /// Registers a cron schedule. Inactive schedules are skipped and return
    /// `None`; an invalid cron expression is an error.
    pub async fn register(&self, schedule: &WorkflowSchedule) -> WorkflowResult<Option<Uuid>> {
        if !schedule.is_active {
            info!(schedule_id = %schedule.id, "Skipping inactive workflow schedule");
            return Ok(None);
        }

        let engine = self.engine.clone();
        let runs = self.runs.clone();
        let schedule_id = schedule.id;
        let workflow_id = schedule.workflow_id;

        let job = Job::new_async(schedule.cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let runs = runs.clone();

            Box::pin(async move {
                let event = TriggerEvent::scheduled(workflow_id, schedule_id);
                let result = engine
                    .trigger_workflow(workflow_id, TriggerType::Scheduled, event.context)
                    .await;

                if let Err(e) = &result {
                    error!(%workflow_id, %schedule_id, error = %e, "Scheduled workflow run failed to dispatch");
                }

                let mut runs = runs.write().await;
                runs.push_back(ScheduledRun {
                    schedule_id,
                    workflow_id,
                    fired_at: Utc::now(),
                    error: result.err().map(|e| e.to_string()),
                });
                if runs.len() > RUN_LOG_LIMIT {
                    runs.pop_front();
                }
            })
        })?;

        let job_id = self.scheduler.add(job).await?;
        info!(%workflow_id, cron = %schedule.cron_expr, "Scheduled workflow");
        Ok(Some(job_id))
    }

    pub async fn start(&self) -> WorkflowResult<()> {
        self.scheduler.start().await?;
        info!("Workflow scheduler started");
        Ok(())
    }

    pub async fn shutdown(&self) -> WorkflowResult<()> {
        info!("Shutting down workflow scheduler");
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        Ok(())
    }

    /// Most recent scheduled runs, oldest first.
    pub async fn recent_runs(&self) -> Vec<ScheduledRun> {
        self.runs.read().await.iter().cloned().collect()
    }
}
