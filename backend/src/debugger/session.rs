//! Debug session state as seen by readers.
//!
//! A session is owned by its simulation task; everything here is a plain
//! snapshot type. Coverage and performance are always derived from the
//! execution path by [`summarize`], so an exported session can be
//! re-summarized to the same numbers.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ticketflow_shared::{Workflow, WorkflowContext};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Trigger,
    Condition,
    Action,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Trigger => "trigger",
            ComponentKind::Condition => "condition",
            ComponentKind::Action => "action",
        }
    }
}

/// Component ids look like `trigger_0`, `condition_1`, `action_2`.
pub fn component_id(kind: ComponentKind, index: usize) -> String {
    format!("{}_{}", kind.as_str(), index)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStep {
    pub component_id: String,
    pub component_type: ComponentKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub status: StepStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Variables as they were when the step started.
    pub variables: WorkflowContext,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointType {
    Before,
    After,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Breakpoint {
    pub id: Uuid,
    pub component_id: String,
    #[serde(rename = "type")]
    pub breakpoint_type: BreakpointType,
    pub enabled: bool,
    pub hit_count: u32,
}

impl Breakpoint {
    pub fn new(component_id: impl Into<String>, breakpoint_type: BreakpointType) -> Self {
        Self {
            id: Uuid::new_v4(),
            component_id: component_id.into(),
            breakpoint_type,
            enabled: true,
            hit_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Performance {
    pub total_duration_ms: i64,
    pub step_durations: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Coverage {
    pub total_components: usize,
    pub executed_components: usize,
    pub coverage_percent: f64,
    pub condition_coverage: BTreeMap<String, bool>,
}

/// Derives coverage and timing from an execution path.
///
/// A component counts as executed once one of its steps has finished.
/// Condition coverage records the last result of each condition step.
pub fn summarize(total_components: usize, path: &[ExecutionStep]) -> (Coverage, Performance) {
    let mut executed = HashSet::new();
    let mut condition_coverage = BTreeMap::new();
    let mut performance = Performance::default();

    for step in path.iter().filter(|s| s.status != StepStatus::Running) {
        executed.insert(step.component_id.as_str());
        performance.total_duration_ms += step.duration_ms;
        *performance
            .step_durations
            .entry(step.component_id.clone())
            .or_insert(0) += step.duration_ms;

        if step.component_type == ComponentKind::Condition {
            if let Some(result) = step
                .output
                .as_ref()
                .and_then(|o| o.get("result"))
                .and_then(Value::as_bool)
            {
                condition_coverage.insert(step.component_id.clone(), result);
            }
        }
    }

    let executed_components = executed.len();
    let coverage_percent = if total_components == 0 {
        0.0
    } else {
        100.0 * executed_components as f64 / total_components as f64
    };

    (
        Coverage {
            total_components,
            executed_components,
            coverage_percent,
            condition_coverage,
        },
        performance,
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugSession {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub status: SessionStatus,
    pub current_step: usize,
    pub current_component: Option<String>,
    pub execution_path: Vec<ExecutionStep>,
    pub variables: WorkflowContext,
    pub breakpoints: Vec<Breakpoint>,
    pub logs: Vec<DebugLog>,
    pub performance: Performance,
    pub coverage: Coverage,
    pub pause_reason: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DebugSession {
    pub fn new(workflow: &Workflow, test_data: WorkflowContext) -> Self {
        let (coverage, performance) = summarize(workflow.component_count(), &[]);
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            status: SessionStatus::Running,
            current_step: 0,
            current_component: None,
            execution_path: Vec::new(),
            variables: test_data,
            breakpoints: Vec::new(),
            logs: Vec::new(),
            performance,
            coverage,
            pause_reason: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn refresh_summary(&mut self) {
        let (coverage, performance) = summarize(self.coverage.total_components, &self.execution_path);
        self.coverage = coverage;
        self.performance = performance;
    }

    pub fn log(&mut self, level: LogLevel, component_id: Option<&str>, message: impl Into<String>) {
        self.logs.push(DebugLog {
            timestamp: Utc::now(),
            level,
            component_id: component_id.map(str::to_string),
            message: message.into(),
        });
    }
}

/// Serializable copy of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugSessionExport {
    pub session: DebugSession,
    pub exported_at: DateTime<Utc>,
}

impl DebugSessionExport {
    pub fn new(session: DebugSession) -> Self {
        Self {
            session,
            exported_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Recomputes coverage and performance from the exported path.
    pub fn summarize(&self) -> (Coverage, Performance) {
        summarize(self.session.coverage.total_components, &self.session.execution_path)
    }
}
