// Debug Controller - simulated workflow runs with breakpoints and step mode

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use ticketflow_shared::{Action, ActionConfig, TriggerType, Workflow, WorkflowContext};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::failure::{FailureInjector, NoFailures, ScriptedFailures, SeededFailureInjector};
use super::session::{
    component_id, Breakpoint, BreakpointType, ComponentKind, DebugSession, DebugSessionExport, ExecutionStep,
    LogLevel, SessionStatus, StepStatus,
};
use crate::error::{WorkflowError, WorkflowResult};
use crate::workflows::conditions::{lookup, value_to_string};
use crate::workflows::repository::WorkflowRepository;
use crate::workflows::{ConditionEvaluator, TemplateResolver};

#[derive(Debug, Clone, PartialEq)]
pub struct DebugConfig {
    /// Wall-clock limit for a single test scenario.
    pub test_timeout: Duration,
    /// Failure probability for simulated actions when no explicit list is given.
    pub failure_rate: f64,
    pub failure_seed: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(30),
            failure_rate: 0.2,
            failure_seed: 42,
        }
    }
}

/// Settings applied before the session task takes its first step.
#[derive(Debug, Clone, Default)]
pub struct DebugOptions {
    pub breakpoints: Vec<Breakpoint>,
    pub step_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Resume,
    Stop,
}

type BreakpointMap = Arc<RwLock<HashMap<Uuid, Vec<Breakpoint>>>>;
type StepModeMap = Arc<RwLock<HashMap<Uuid, bool>>>;

struct SessionHandle {
    snapshot: watch::Receiver<DebugSession>,
    commands: mpsc::UnboundedSender<DebugCommand>,
}

pub struct DebugController {
    workflows: Arc<dyn WorkflowRepository>,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    breakpoints: BreakpointMap,
    step_mode: StepModeMap,
    injector: Arc<dyn FailureInjector>,
    config: DebugConfig,
}

impl DebugController {
    pub fn new(workflows: Arc<dyn WorkflowRepository>, config: DebugConfig) -> Self {
        let injector = Arc::new(SeededFailureInjector::new(config.failure_rate, config.failure_seed));
        Self {
            workflows,
            sessions: RwLock::new(HashMap::new()),
            breakpoints: Arc::new(RwLock::new(HashMap::new())),
            step_mode: Arc::new(RwLock::new(HashMap::new())),
            injector,
            config,
        }
    }

    /// Replaces the default seeded injector used when test data asks for
    /// simulated failures without listing `fail_actions`.
    pub fn with_injector(mut self, injector: Arc<dyn FailureInjector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn config(&self) -> &DebugConfig {
        &self.config
    }

    pub async fn start_debug_session(&self, workflow_id: Uuid, test_data: WorkflowContext) -> WorkflowResult<Uuid> {
        self.start_debug_session_with(workflow_id, test_data, DebugOptions::default())
            .await
    }

    /// Starts a simulated run. Breakpoints and step mode from `options` are in
    /// place before the first component is visited.
    pub async fn start_debug_session_with(
        &self,
        workflow_id: Uuid,
        test_data: WorkflowContext,
        options: DebugOptions,
    ) -> WorkflowResult<Uuid> {
        let workflow = self.workflows.get_by_id(workflow_id).await?;

        let injector: Arc<dyn FailureInjector> = if test_data.get("simulate_failures") == Some(&Value::Bool(true)) {
            match ScriptedFailures::from_test_data(&test_data) {
                Some(scripted) => Arc::new(scripted),
                None => self.injector.clone(),
            }
        } else {
            Arc::new(NoFailures)
        };

        let mut session = DebugSession::new(&workflow, test_data);
        session.breakpoints = options.breakpoints.clone();
        let session_id = session.id;

        self.breakpoints
            .write()
            .await
            .insert(session_id, options.breakpoints);
        self.step_mode
            .write()
            .await
            .insert(session_id, options.step_mode);

        let (snapshot_tx, snapshot_rx) = watch::channel(session.clone());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        self.sessions.write().await.insert(
            session_id,
            SessionHandle {
                snapshot: snapshot_rx,
                commands: command_tx,
            },
        );

        let task = SessionTask {
            session,
            workflow,
            snapshot: snapshot_tx,
            commands: command_rx,
            breakpoints: self.breakpoints.clone(),
            step_mode: self.step_mode.clone(),
            injector,
        };
        tokio::spawn(task.run());

        info!(%session_id, %workflow_id, "Debug session started");
        Ok(session_id)
    }

    /// Continues a paused session.
    pub async fn resume(&self, session_id: Uuid) -> WorkflowResult<()> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(&session_id)
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))?;

        let status = handle.snapshot.borrow().status;
        if status != SessionStatus::Paused {
            return Err(WorkflowError::InvalidState(format!(
                "debug session {} is not paused",
                session_id
            )));
        }

        handle
            .commands
            .send(DebugCommand::Resume)
            .map_err(|_| WorkflowError::InvalidState(format!("debug session {} has finished", session_id)))
    }

    /// Ends a running or paused session as failed. The task notices the
    /// request at its next component boundary.
    pub async fn stop(&self, session_id: Uuid) -> WorkflowResult<()> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(&session_id)
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))?;

        if handle.snapshot.borrow().status.is_terminal() {
            return Err(WorkflowError::InvalidState(format!(
                "debug session {} has finished",
                session_id
            )));
        }

        handle
            .commands
            .send(DebugCommand::Stop)
            .map_err(|_| WorkflowError::InvalidState(format!("debug session {} has finished", session_id)))
    }

    pub async fn set_breakpoint(
        &self,
        session_id: Uuid,
        component_id: impl Into<String>,
        breakpoint_type: BreakpointType,
    ) -> WorkflowResult<Uuid> {
        let mut breakpoints = self.breakpoints.write().await;
        let list = breakpoints
            .get_mut(&session_id)
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))?;

        let breakpoint = Breakpoint::new(component_id, breakpoint_type);
        let id = breakpoint.id;
        debug!(%session_id, breakpoint_id = %id, component = %breakpoint.component_id, "Breakpoint set");
        list.push(breakpoint);
        Ok(id)
    }

    pub async fn remove_breakpoint(&self, session_id: Uuid, breakpoint_id: Uuid) -> WorkflowResult<()> {
        let mut breakpoints = self.breakpoints.write().await;
        let list = breakpoints
            .get_mut(&session_id)
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))?;

        let before = list.len();
        list.retain(|b| b.id != breakpoint_id);
        if list.len() == before {
            return Err(WorkflowError::not_found("Breakpoint", breakpoint_id));
        }
        Ok(())
    }

    pub async fn list_breakpoints(&self, session_id: Uuid) -> WorkflowResult<Vec<Breakpoint>> {
        self.breakpoints
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))
    }

    pub async fn set_step_mode(&self, session_id: Uuid, enabled: bool) -> WorkflowResult<()> {
        let mut modes = self.step_mode.write().await;
        let mode = modes
            .get_mut(&session_id)
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))?;
        *mode = enabled;
        Ok(())
    }

    /// Current snapshot, with breakpoint hit counts as of now.
    pub async fn get_debug_session(&self, session_id: Uuid) -> WorkflowResult<DebugSession> {
        let mut session = {
            let sessions = self.sessions.read().await;
            let handle = sessions
                .get(&session_id)
                .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))?;
            handle.snapshot.borrow().clone()
        };

        if let Some(breakpoints) = self.breakpoints.read().await.get(&session_id) {
            session.breakpoints = breakpoints.clone();
        }
        Ok(session)
    }

    pub async fn subscribe(&self, session_id: Uuid) -> WorkflowResult<watch::Receiver<DebugSession>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|h| h.snapshot.clone())
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))
    }

    /// Waits until the session is completed or failed. `Ok(None)` means the
    /// timeout elapsed first.
    pub async fn wait_for_completion(
        &self,
        session_id: Uuid,
        timeout: Duration,
    ) -> WorkflowResult<Option<DebugSession>> {
        let mut rx = self.subscribe(session_id).await?;

        // A closed channel means the task is gone; report whatever it left.
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| s.status.is_terminal()).await.is_ok()
        })
        .await;

        match waited {
            Ok(_) => self.get_debug_session(session_id).await.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Snapshots of every known session, oldest first.
    pub async fn list_sessions(&self) -> Vec<DebugSession> {
        let mut sessions: Vec<DebugSession> = self
            .sessions
            .read()
            .await
            .values()
            .map(|h| h.snapshot.borrow().clone())
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Forgets a session. A session still in progress is stopped.
    pub async fn remove_session(&self, session_id: Uuid) -> WorkflowResult<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(&session_id)
            .ok_or_else(|| WorkflowError::not_found("Debug session", session_id))?;

        if !handle.snapshot.borrow().status.is_terminal() {
            let _ = handle.commands.send(DebugCommand::Stop);
        }
        self.breakpoints.write().await.remove(&session_id);
        self.step_mode.write().await.remove(&session_id);

        info!(%session_id, "Debug session removed");
        Ok(())
    }

    pub async fn export_session(&self, session_id: Uuid) -> WorkflowResult<DebugSessionExport> {
        let session = self.get_debug_session(session_id).await?;
        Ok(DebugSessionExport::new(session))
    }
}

/// Why the simulated run ended before its last component.
enum Halt {
    Stopped,
    ActionFailed(String),
}

/// Sole owner of a [`DebugSession`] while it runs.
struct SessionTask {
    session: DebugSession,
    workflow: Workflow,
    snapshot: watch::Sender<DebugSession>,
    commands: mpsc::UnboundedReceiver<DebugCommand>,
    breakpoints: BreakpointMap,
    step_mode: StepModeMap,
    injector: Arc<dyn FailureInjector>,
}

impl SessionTask {
    async fn run(mut self) {
        let session_id = self.session.id;
        let name = self.workflow.name.clone();
        self.session
            .log(LogLevel::Info, None, format!("Debug session started for workflow '{}'", name));
        self.publish().await;

        match self.simulate().await {
            Ok(()) => {
                self.session.status = SessionStatus::Completed;
                self.session
                    .log(LogLevel::Info, None, "Debug session completed");
                info!(%session_id, "Debug session completed");
            }
            Err(Halt::Stopped) => {
                self.session.status = SessionStatus::Failed;
                self.session.error = Some("stopped".to_string());
                self.session
                    .log(LogLevel::Warn, None, "Debug session stopped");
                info!(%session_id, "Debug session stopped");
            }
            Err(Halt::ActionFailed(error)) => {
                self.session.status = SessionStatus::Failed;
                self.session
                    .log(LogLevel::Error, None, format!("Debug session failed: {}", error));
                self.session.error = Some(error);
                warn!(%session_id, "Debug session failed");
            }
        }

        self.session.pause_reason = None;
        self.session.current_component = None;
        self.session.completed_at = Some(Utc::now());
        self.publish().await;
    }

    async fn simulate(&mut self) -> Result<(), Halt> {
        let workflow = self.workflow.clone();

        let requested = self
            .session
            .variables
            .get("trigger_type")
            .and_then(Value::as_str)
            .and_then(|t| t.parse::<TriggerType>().ok());

        let mut fired = false;
        for (index, trigger) in workflow.triggers.iter().enumerate() {
            let id = component_id(ComponentKind::Trigger, index);
            self.checkpoint(&id, BreakpointType::Before).await?;

            let step = self.start_step(ComponentKind::Trigger, &id, json!({ "type": trigger.trigger_type }))
                .await;
            let matches = trigger.is_active
                && requested.is_none_or(|t| t == trigger.trigger_type)
                && trigger.config.matches(&self.session.variables);
            fired |= matches;
            self.finish_step(step, Ok(json!({ "fired": matches }))).await;

            self.checkpoint(&id, BreakpointType::After).await?;
        }

        if !fired {
            self.session
                .log(LogLevel::Info, None, "No trigger fired, nothing to run");
            return Ok(());
        }

        for (index, condition) in workflow.conditions.iter().enumerate() {
            let id = component_id(ComponentKind::Condition, index);
            self.checkpoint(&id, BreakpointType::Before).await?;

            let input = json!({
                "field": condition.field,
                "operator": condition.operator,
                "value": condition.value,
                "actual": lookup(&self.session.variables, &condition.field),
            });
            let step = self.start_step(ComponentKind::Condition, &id, input).await;
            let result = ConditionEvaluator::evaluate(condition, &self.session.variables);
            self.finish_step(step, Ok(json!({ "result": result }))).await;

            self.checkpoint(&id, BreakpointType::After).await?;

            if !result {
                let field = condition.field.clone();
                self.session.log(
                    LogLevel::Info,
                    Some(&id),
                    format!("Condition on '{}' not met, skipping actions", field),
                );
                return Ok(());
            }
        }

        for (index, action) in workflow.actions.iter().enumerate() {
            let id = component_id(ComponentKind::Action, index);
            self.checkpoint(&id, BreakpointType::Before).await?;

            let input = json!({
                "type": action.action_type(),
                "config": action.config.to_value(),
                "delay_seconds": action.delay_seconds,
            });
            let step = self.start_step(ComponentKind::Action, &id, input).await;

            if self.injector.should_fail(self.session.id, index, action) {
                let error = format!("Simulated failure in action {}", action.action_type());
                self.finish_step(step, Err(error.clone())).await;
                self.session.log(LogLevel::Error, Some(&id), error.clone());
                self.checkpoint(&id, BreakpointType::Error).await?;

                if !action.continue_on_error {
                    return Err(Halt::ActionFailed(error));
                }
                continue;
            }

            let output = simulate_action(index, action, &mut self.session.variables);
            self.finish_step(step, Ok(output)).await;
            self.checkpoint(&id, BreakpointType::After).await?;
        }

        Ok(())
    }

    async fn start_step(&mut self, kind: ComponentKind, id: &str, input: Value) -> usize {
        self.session.execution_path.push(ExecutionStep {
            component_id: id.to_string(),
            component_type: kind,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: 0,
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            variables: self.session.variables.clone(),
        });
        self.session.current_step = self.session.execution_path.len();
        self.session.current_component = Some(id.to_string());
        self.publish().await;
        self.session.execution_path.len() - 1
    }

    async fn finish_step(&mut self, index: usize, result: Result<Value, String>) {
        if let Some(step) = self.session.execution_path.get_mut(index) {
            let end = Utc::now();
            step.end_time = Some(end);
            step.duration_ms = (end - step.start_time).num_milliseconds();
            match result {
                Ok(output) => {
                    step.status = StepStatus::Completed;
                    step.output = Some(output);
                }
                Err(error) => {
                    step.status = StepStatus::Failed;
                    step.error = Some(error);
                }
            }
        }
        self.publish().await;
    }

    /// Honors a pending stop and pauses when step mode or a breakpoint asks
    /// for it.
    async fn checkpoint(&mut self, component: &str, phase: BreakpointType) -> Result<(), Halt> {
        match self.commands.try_recv() {
            Ok(DebugCommand::Stop) | Err(mpsc::error::TryRecvError::Disconnected) => return Err(Halt::Stopped),
            Ok(DebugCommand::Resume) | Err(mpsc::error::TryRecvError::Empty) => {}
        }

        let Some(reason) = self.should_break(component, phase).await else {
            return Ok(());
        };

        self.session.status = SessionStatus::Paused;
        self.session.current_component = Some(component.to_string());
        self.session
            .log(LogLevel::Info, Some(component), format!("Paused: {}", reason));
        self.session.pause_reason = Some(reason);
        self.publish().await;
        debug!(session_id = %self.session.id, component, "Debug session paused");

        match self.commands.recv().await {
            Some(DebugCommand::Resume) => {
                self.session.status = SessionStatus::Running;
                self.session.pause_reason = None;
                self.session
                    .log(LogLevel::Info, Some(component), "Resumed");
                self.publish().await;
                Ok(())
            }
            Some(DebugCommand::Stop) | None => Err(Halt::Stopped),
        }
    }

    async fn should_break(&self, component: &str, phase: BreakpointType) -> Option<String> {
        let session_id = self.session.id;

        let stepping = self
            .step_mode
            .read()
            .await
            .get(&session_id)
            .copied()
            .unwrap_or(false);
        match phase {
            BreakpointType::Before if stepping => return Some(format!("step before {}", component)),
            BreakpointType::After if stepping => return Some(format!("step after {}", component)),
            _ => {}
        }

        let mut breakpoints = self.breakpoints.write().await;
        let hit = breakpoints.get_mut(&session_id)?.iter_mut().find(|b| {
            b.enabled && b.breakpoint_type == phase && b.component_id == component
        })?;
        hit.hit_count += 1;

        let phase = match phase {
            BreakpointType::Before => "before",
            BreakpointType::After => "after",
            BreakpointType::Error => "on error in",
        };
        Some(format!("breakpoint {} {}", phase, component))
    }

    async fn publish(&mut self) {
        self.session.refresh_summary();
        if let Some(breakpoints) = self.breakpoints.read().await.get(&self.session.id) {
            self.session.breakpoints = breakpoints.clone();
        }
        self.snapshot.send_replace(self.session.clone());
    }
}

/// Applies an action's effect to the session variables as marker values
/// instead of calling any collaborator. Returns the step output.
fn simulate_action(index: usize, action: &Action, variables: &mut WorkflowContext) -> Value {
    let mut markers = serde_json::Map::new();

    match &action.config {
        ActionConfig::AssignTicket(config) => {
            if let Some(user) = config.assign_to_user_id {
                markers.insert("assigned_user_id".into(), json!(user));
            }
            if let Some(group) = config.assign_to_group_id {
                markers.insert("assigned_group_id".into(), json!(group));
            }
            markers.insert("assignment_method".into(), json!(config.method.as_str()));
        }
        ActionConfig::ChangeStatus(config) => {
            let status = TemplateResolver::resolve(&config.new_status, variables);
            markers.insert("new_status".into(), json!(status));
            markers.insert("status".into(), json!(status));
        }
        ActionConfig::ChangePriority(config) => {
            let priority = TemplateResolver::resolve(&config.new_priority, variables);
            markers.insert("new_priority".into(), json!(priority));
            markers.insert("priority".into(), json!(priority));
        }
        ActionConfig::SendEmail(config) => {
            markers.insert("email_sent".into(), json!(true));
            markers.insert("email_to".into(), json!(config.email_to));
            markers.insert(
                "email_subject".into(),
                json!(TemplateResolver::resolve(&config.email_subject, variables)),
            );
        }
        ActionConfig::SendNotification(config) => {
            markers.insert("notification_sent".into(), json!(true));
            markers.insert("notified_users".into(), json!(config.notify_user_ids.len()));
        }
        ActionConfig::AddTag(config) => {
            let mut tags = current_tags(variables);
            for tag in &config.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
            markers.insert("tags".into(), json!(tags));
        }
        ActionConfig::RemoveTag(config) => {
            let mut tags = current_tags(variables);
            tags.retain(|t| !config.tags.contains(t));
            markers.insert("tags".into(), json!(tags));
        }
        ActionConfig::AddNote(config) => {
            markers.insert("note_added".into(), json!(true));
            markers.insert(
                "last_note".into(),
                json!(TemplateResolver::resolve(&config.note_content, variables)),
            );
        }
        ActionConfig::Escalate(config) => {
            let level = variables
                .get("escalation_level")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            markers.insert("escalated".into(), json!(true));
            markers.insert("escalation_level".into(), json!(level + 1));
            if let Some(reason) = &config.reason {
                markers.insert("escalation_reason".into(), json!(reason));
            }
        }
        ActionConfig::WebhookCall(config) => {
            markers.insert("webhook_called".into(), json!(true));
            markers.insert(
                "webhook_url".into(),
                json!(TemplateResolver::resolve(&config.webhook_url, variables)),
            );
        }
        ActionConfig::SetSla(config) => {
            markers.insert("sla_applied".into(), json!(true));
            if let Some(policy) = config.sla_policy_id {
                markers.insert("sla_policy_id".into(), json!(policy));
            }
        }
        ActionConfig::UpdateCustomField(config) => {
            let value = TemplateResolver::resolve_value(&config.custom_field_value, variables);
            let mut fields = variables
                .get("custom_fields")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            fields.insert(config.custom_field_name.clone(), value);
            markers.insert("custom_fields".into(), Value::Object(fields));
        }
    }

    markers.insert(format!("action_{}_executed", index), json!(true));
    for (key, value) in &markers {
        variables.insert(key.clone(), value.clone());
    }
    Value::Object(markers)
}

fn current_tags(variables: &WorkflowContext) -> Vec<String> {
    match variables.get("tags") {
        Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
        _ => Vec::new(),
    }
}
