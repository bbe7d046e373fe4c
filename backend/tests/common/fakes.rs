use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use ticketflow::error::{WorkflowError, WorkflowResult};
use ticketflow::services::{EmailService, NotificationService};

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Records every email. When gated, each send waits for a permit released
/// through [`RecordingEmail::release`], which lets a test hold pool workers
/// busy for as long as it needs.
pub struct RecordingEmail {
    sent: Mutex<Vec<SentEmail>>,
    gate: Option<Semaphore>,
    entered: AtomicUsize,
    entered_signal: Notify,
    fail: AtomicBool,
}

impl RecordingEmail {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            gate: None,
            entered: AtomicUsize::new(0),
            entered_signal: Notify::new(),
            fail: AtomicBool::new(false),
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Waits until `count` sends have started.
    pub async fn wait_entered(&self, count: usize) {
        loop {
            let signal = self.entered_signal.notified();
            if self.entered.load(Ordering::SeqCst) >= count {
                return;
            }
            signal.await;
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailService for RecordingEmail {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> WorkflowResult<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.entered_signal.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| WorkflowError::ActionExecution("gate closed".to_string()))?
                .forget();
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(WorkflowError::ActionExecution("SMTP unavailable".to_string()));
        }

        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Records notifications; users in the failing set get an error instead.
#[derive(Default)]
pub struct RecordingNotifications {
    sent: Mutex<Vec<(Uuid, String)>>,
    failing: Mutex<HashSet<Uuid>>,
}

impl RecordingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, user_id: Uuid) {
        self.failing.lock().unwrap().insert(user_id);
    }

    pub fn sent(&self) -> Vec<(Uuid, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifications {
    async fn send_notification(&self, user_id: Uuid, text: &str) -> WorkflowResult<()> {
        if self.failing.lock().unwrap().contains(&user_id) {
            return Err(WorkflowError::ActionExecution(format!("user {} unreachable", user_id)));
        }
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }
}
