// Execution Pool - bounded FIFO queue drained by a fixed set of workers

use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use ticketflow_shared::{TriggerType, Workflow, WorkflowContext};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::WorkflowExecutor;
use crate::error::{WorkflowError, WorkflowResult};

/// What `submit` does when the queue is full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the submission with a dispatch error.
    #[default]
    Reject,
    /// Wait until a worker frees a slot.
    Block,
    /// Evict the oldest queued execution to make room.
    DropOldest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(OverflowPolicy::Reject),
            "block" => Ok(OverflowPolicy::Block),
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!("unknown overflow policy '{}'", other)),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Reject => "reject",
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropOldest => "drop_oldest",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionPoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for ExecutionPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            overflow: OverflowPolicy::Reject,
        }
    }
}

/// One queued workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub workflow: Workflow,
    pub trigger_type: TriggerType,
    pub context: WorkflowContext,
    pub enqueued_at: DateTime<Utc>,
}

impl ExecutionTask {
    pub fn new(workflow: Workflow, trigger_type: TriggerType, context: WorkflowContext) -> Self {
        Self {
            workflow,
            trigger_type,
            context,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub queued: usize,
}

struct PoolShared {
    queue: Mutex<VecDeque<ExecutionTask>>,
    capacity: usize,
    overflow: OverflowPolicy,
    work_ready: Notify,
    space_ready: Notify,
    closed: AtomicBool,
    shutdown: CancellationToken,
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

impl PoolShared {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<ExecutionTask>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept(&self, queue: &mut VecDeque<ExecutionTask>, task: ExecutionTask) {
        queue.push_back(task);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.work_ready.notify_one();
    }
}

pub struct ExecutionPool {
    shared: Arc<PoolShared>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutionPool {
    /// Spawns the workers on the current runtime.
    pub fn start(config: ExecutionPoolConfig, executor: Arc<WorkflowExecutor>) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::with_capacity(config.queue_capacity.max(1))),
            capacity: config.queue_capacity.max(1),
            overflow: config.overflow,
            work_ready: Notify::new(),
            space_ready: Notify::new(),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let workers = (0..config.workers.max(1))
            .map(|id| tokio::spawn(run_worker(id, shared.clone(), executor.clone())))
            .collect();

        info!(
            workers = config.workers.max(1),
            capacity = shared.capacity,
            overflow = %shared.overflow,
            "Execution pool started"
        );

        Self {
            shared,
            workers: tokio::sync::Mutex::new(workers),
        }
    }

    /// Queues a run, applying the overflow policy when the queue is full.
    pub async fn submit(&self, task: ExecutionTask) -> WorkflowResult<()> {
        let shared = &self.shared;

        loop {
            if shared.closed.load(Ordering::Acquire) {
                shared.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(WorkflowError::Dispatch("execution pool is shut down".to_string()));
            }

            {
                let mut queue = shared.lock_queue();
                if queue.len() < shared.capacity {
                    shared.accept(&mut queue, task);
                    return Ok(());
                }

                match shared.overflow {
                    OverflowPolicy::Reject => {
                        shared.rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(WorkflowError::Dispatch(format!(
                            "execution queue is full ({} pending)",
                            shared.capacity
                        )));
                    }
                    OverflowPolicy::DropOldest => {
                        if let Some(evicted) = queue.pop_front() {
                            shared.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                workflow_id = %evicted.workflow.id,
                                enqueued_at = %evicted.enqueued_at,
                                "Execution queue full, dropping oldest queued run"
                            );
                        }
                        shared.accept(&mut queue, task);
                        return Ok(());
                    }
                    OverflowPolicy::Block => {}
                }
            }

            tokio::select! {
                _ = shared.space_ready.notified() => {}
                _ = shared.shutdown.cancelled() => {}
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            submitted: shared.submitted.load(Ordering::Relaxed),
            completed: shared.completed.load(Ordering::Relaxed),
            rejected: shared.rejected.load(Ordering::Relaxed),
            dropped: shared.dropped.load(Ordering::Relaxed),
            queued: shared.lock_queue().len(),
        }
    }

    /// Stops accepting work, lets the workers drain the queue, then waits
    /// for them to exit.
    pub async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.shutdown.cancel();

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Execution worker ended abnormally");
            }
        }
        info!("Execution pool stopped");
    }
}

async fn run_worker(id: usize, shared: Arc<PoolShared>, executor: Arc<WorkflowExecutor>) {
    debug!(worker = id, "Execution worker started");

    loop {
        let next = shared.lock_queue().pop_front();
        match next {
            Some(task) => {
                shared.space_ready.notify_one();
                let run = AssertUnwindSafe(executor.execute_workflow(&task.workflow, task.trigger_type, &task.context))
                    .catch_unwind()
                    .await;
                if run.is_err() {
                    error!(worker = id, workflow_id = %task.workflow.id, "Workflow execution panicked");
                }
                shared.completed.fetch_add(1, Ordering::Relaxed);
            }
            None if shared.closed.load(Ordering::Acquire) => break,
            None => {
                tokio::select! {
                    _ = shared.work_ready.notified() => {}
                    _ = shared.shutdown.cancelled() => {}
                }
            }
        }
    }

    debug!(worker = id, "Execution worker stopped");
}
