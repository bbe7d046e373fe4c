use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event payload handed to triggers, conditions and templates.
pub type WorkflowContext = serde_json::Map<String, Value>;

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "workflow_status", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Inactive,
    Archived,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Inactive => "inactive",
            WorkflowStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_system: bool,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: i64,
    #[serde(default)]
    pub error_count: i64,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            status: WorkflowStatus::Draft,
            priority: 0,
            is_system: false,
            triggers: Vec::new(),
            conditions: Vec::new(),
            actions: Vec::new(),
            tags: Vec::new(),
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
            last_run_at: None,
            run_count: 0,
            error_count: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    /// True when an active trigger of this type accepts the context.
    pub fn is_triggered_by(&self, trigger_type: TriggerType, context: &WorkflowContext) -> bool {
        self.triggers
            .iter()
            .any(|t| t.is_active && t.trigger_type == trigger_type && t.config.matches(context))
    }

    /// Triggers, conditions and actions together.
    pub fn component_count(&self) -> usize {
        self.triggers.len() + self.conditions.len() + self.actions.len()
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    TicketCreated,
    TicketUpdated,
    TicketAssigned,
    StatusChanged,
    PriorityChanged,
    CustomerReply,
    AgentReply,
    TimeBasedSla,
    Scheduled,
    Webhook,
    Manual,
}

impl TriggerType {
    pub const ALL: [TriggerType; 11] = [
        TriggerType::TicketCreated,
        TriggerType::TicketUpdated,
        TriggerType::TicketAssigned,
        TriggerType::StatusChanged,
        TriggerType::PriorityChanged,
        TriggerType::CustomerReply,
        TriggerType::AgentReply,
        TriggerType::TimeBasedSla,
        TriggerType::Scheduled,
        TriggerType::Webhook,
        TriggerType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::TicketCreated => "ticket_created",
            TriggerType::TicketUpdated => "ticket_updated",
            TriggerType::TicketAssigned => "ticket_assigned",
            TriggerType::StatusChanged => "status_changed",
            TriggerType::PriorityChanged => "priority_changed",
            TriggerType::CustomerReply => "customer_reply",
            TriggerType::AgentReply => "agent_reply",
            TriggerType::TimeBasedSla => "time_based_sla",
            TriggerType::Scheduled => "scheduled",
            TriggerType::Webhook => "webhook",
            TriggerType::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown trigger type '{}'", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub config: TriggerConfig,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Trigger {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_type,
            config: TriggerConfig::default(),
            is_active: true,
        }
    }

    pub fn with_config(mut self, config: TriggerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Transition filters. A filter that is unset, or whose context key is
/// missing, does not reject the event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_priority: Option<String>,
}

impl TriggerConfig {
    pub fn matches(&self, context: &WorkflowContext) -> bool {
        let filter = |expected: &Option<String>, key: &str| match expected {
            None => true,
            Some(expected) => match context.get(key).and_then(Value::as_str) {
                Some(actual) => actual == expected,
                None => true,
            },
        };

        filter(&self.from_status, "old_status")
            && filter(&self.to_status, "new_status")
            && filter(&self.from_priority, "old_priority")
            && filter(&self.to_priority, "new_priority")
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    MatchesRegex,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    In,
    NotIn,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOperator::Contains, value)
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AssignTicket,
    ChangeStatus,
    ChangePriority,
    SendEmail,
    SendNotification,
    AddTag,
    RemoveTag,
    AddNote,
    Escalate,
    WebhookCall,
    SetSla,
    UpdateCustomField,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AssignTicket => "assign_ticket",
            ActionType::ChangeStatus => "change_status",
            ActionType::ChangePriority => "change_priority",
            ActionType::SendEmail => "send_email",
            ActionType::SendNotification => "send_notification",
            ActionType::AddTag => "add_tag",
            ActionType::RemoveTag => "remove_tag",
            ActionType::AddNote => "add_note",
            ActionType::Escalate => "escalate",
            ActionType::WebhookCall => "webhook_call",
            ActionType::SetSla => "set_sla",
            ActionType::UpdateCustomField => "update_custom_field",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    #[default]
    Direct,
    RoundRobin,
    LeastLoaded,
    SkillsBased,
}

impl AssignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMethod::Direct => "direct",
            AssignmentMethod::RoundRobin => "round_robin",
            AssignmentMethod::LeastLoaded => "least_loaded",
            AssignmentMethod::SkillsBased => "skills_based",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssignTicketConfig {
    #[serde(default)]
    pub assign_to_user_id: Option<Uuid>,
    #[serde(default)]
    pub assign_to_group_id: Option<Uuid>,
    #[serde(default, alias = "assignment_method")]
    pub method: AssignmentMethod,
    /// Skills for `skills_based`; the ticket's tags are used when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_skills: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeStatusConfig {
    pub new_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangePriorityConfig {
    pub new_priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendEmailConfig {
    pub email_to: Vec<String>,
    pub email_subject: String,
    pub email_body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendNotificationConfig {
    pub notify_user_ids: Vec<Uuid>,
    pub notification_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagConfig {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddNoteConfig {
    pub note_content: String,
    #[serde(default)]
    pub note_is_internal: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EscalateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to_user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to_group_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookCallConfig {
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_method: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub webhook_headers: HashMap<String, String>,
    /// Template for the request body; the context is sent as JSON when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_body: Option<String>,
}

/// Upper bound for SLA deadlines, ten years out.
pub const MAX_SLA_MINUTES: i64 = 10 * 365 * 24 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SetSlaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_policy_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateCustomFieldConfig {
    pub custom_field_name: String,
    #[serde(default)]
    pub custom_field_value: Value,
}

/// Typed action configuration, one variant per [`ActionType`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionConfig {
    AssignTicket(AssignTicketConfig),
    ChangeStatus(ChangeStatusConfig),
    ChangePriority(ChangePriorityConfig),
    SendEmail(SendEmailConfig),
    SendNotification(SendNotificationConfig),
    AddTag(TagConfig),
    RemoveTag(TagConfig),
    AddNote(AddNoteConfig),
    Escalate(EscalateConfig),
    WebhookCall(WebhookCallConfig),
    SetSla(SetSlaConfig),
    UpdateCustomField(UpdateCustomFieldConfig),
}

impl ActionConfig {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionConfig::AssignTicket(_) => ActionType::AssignTicket,
            ActionConfig::ChangeStatus(_) => ActionType::ChangeStatus,
            ActionConfig::ChangePriority(_) => ActionType::ChangePriority,
            ActionConfig::SendEmail(_) => ActionType::SendEmail,
            ActionConfig::SendNotification(_) => ActionType::SendNotification,
            ActionConfig::AddTag(_) => ActionType::AddTag,
            ActionConfig::RemoveTag(_) => ActionType::RemoveTag,
            ActionConfig::AddNote(_) => ActionType::AddNote,
            ActionConfig::Escalate(_) => ActionType::Escalate,
            ActionConfig::WebhookCall(_) => ActionType::WebhookCall,
            ActionConfig::SetSla(_) => ActionType::SetSla,
            ActionConfig::UpdateCustomField(_) => ActionType::UpdateCustomField,
        }
    }

    /// Decodes the config object belonging to `action_type`. A missing
    /// config is treated as an empty object.
    pub fn decode(action_type: ActionType, config: Value) -> Result<Self, serde_json::Error> {
        let config = if config.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            config
        };

        Ok(match action_type {
            ActionType::AssignTicket => ActionConfig::AssignTicket(serde_json::from_value(config)?),
            ActionType::ChangeStatus => ActionConfig::ChangeStatus(serde_json::from_value(config)?),
            ActionType::ChangePriority => ActionConfig::ChangePriority(serde_json::from_value(config)?),
            ActionType::SendEmail => ActionConfig::SendEmail(serde_json::from_value(config)?),
            ActionType::SendNotification => ActionConfig::SendNotification(serde_json::from_value(config)?),
            ActionType::AddTag => ActionConfig::AddTag(serde_json::from_value(config)?),
            ActionType::RemoveTag => ActionConfig::RemoveTag(serde_json::from_value(config)?),
            ActionType::AddNote => ActionConfig::AddNote(serde_json::from_value(config)?),
            ActionType::Escalate => ActionConfig::Escalate(serde_json::from_value(config)?),
            ActionType::WebhookCall => ActionConfig::WebhookCall(serde_json::from_value(config)?),
            ActionType::SetSla => ActionConfig::SetSla(serde_json::from_value(config)?),
            ActionType::UpdateCustomField => ActionConfig::UpdateCustomField(serde_json::from_value(config)?),
        })
    }

    pub fn to_value(&self) -> Value {
        let encoded = match self {
            ActionConfig::AssignTicket(c) => serde_json::to_value(c),
            ActionConfig::ChangeStatus(c) => serde_json::to_value(c),
            ActionConfig::ChangePriority(c) => serde_json::to_value(c),
            ActionConfig::SendEmail(c) => serde_json::to_value(c),
            ActionConfig::SendNotification(c) => serde_json::to_value(c),
            ActionConfig::AddTag(c) | ActionConfig::RemoveTag(c) => serde_json::to_value(c),
            ActionConfig::AddNote(c) => serde_json::to_value(c),
            ActionConfig::Escalate(c) => serde_json::to_value(c),
            ActionConfig::WebhookCall(c) => serde_json::to_value(c),
            ActionConfig::SetSla(c) => serde_json::to_value(c),
            ActionConfig::UpdateCustomField(c) => serde_json::to_value(c),
        };
        encoded.unwrap_or(Value::Null)
    }

    /// Shallow presence checks that serde cannot express.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            ActionConfig::AssignTicket(c) => match c.method {
                AssignmentMethod::Direct => {
                    if c.assign_to_user_id.is_none() && c.assign_to_group_id.is_none() {
                        problems.push("assign_to_user_id or assign_to_group_id is required".to_string());
                    }
                }
                method => {
                    if c.assign_to_group_id.is_none() {
                        problems.push(format!("{} assignment requires assign_to_group_id", method.as_str()));
                    }
                }
            },
            ActionConfig::ChangeStatus(c) if c.new_status.trim().is_empty() => {
                problems.push("new_status must not be empty".to_string());
            }
            ActionConfig::ChangePriority(c) if c.new_priority.trim().is_empty() => {
                problems.push("new_priority must not be empty".to_string());
            }
            ActionConfig::SendEmail(c) => {
                if c.email_to.is_empty() {
                    problems.push("email_to must list at least one recipient".to_string());
                }
                if c.email_subject.trim().is_empty() {
                    problems.push("email_subject must not be empty".to_string());
                }
            }
            ActionConfig::SendNotification(c) => {
                if c.notify_user_ids.is_empty() {
                    problems.push("notify_user_ids must list at least one user".to_string());
                }
                if c.notification_text.trim().is_empty() {
                    problems.push("notification_text must not be empty".to_string());
                }
            }
            ActionConfig::AddTag(c) | ActionConfig::RemoveTag(c) if c.tags.is_empty() => {
                problems.push("tags must not be empty".to_string());
            }
            ActionConfig::AddNote(c) if c.note_content.trim().is_empty() => {
                problems.push("note_content must not be empty".to_string());
            }
            ActionConfig::WebhookCall(c) if c.webhook_url.trim().is_empty() => {
                problems.push("webhook_url must not be empty".to_string());
            }
            ActionConfig::SetSla(c) => {
                if c.sla_policy_id.is_none() && c.response_minutes.is_none() && c.resolution_minutes.is_none() {
                    problems.push("set_sla needs sla_policy_id, response_minutes or resolution_minutes".to_string());
                }
                for (field, minutes) in [("response_minutes", c.response_minutes), ("resolution_minutes", c.resolution_minutes)] {
                    if minutes.is_some_and(|m| !(0..=MAX_SLA_MINUTES).contains(&m)) {
                        problems.push(format!("{} must be between 0 and {}", field, MAX_SLA_MINUTES));
                    }
                }
            }
            ActionConfig::UpdateCustomField(c) if c.custom_field_name.trim().is_empty() => {
                problems.push("custom_field_name must not be empty".to_string());
            }
            _ => {}
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub id: Uuid,
    pub config: ActionConfig,
    pub delay_seconds: u32,
    pub continue_on_error: bool,
}

/// Wire form of an [`Action`]: the `type` tag next to an untyped `config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub delay_seconds: u32,
    #[serde(default, alias = "continue_on_err")]
    pub continue_on_error: bool,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let config = ActionConfig::decode(raw.action_type, raw.config)
            .map_err(|e| format!("invalid config for {} action: {}", raw.action_type, e))?;
        Ok(Action {
            id: raw.id,
            config,
            delay_seconds: raw.delay_seconds,
            continue_on_error: raw.continue_on_error,
        })
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        RawAction {
            id: action.id,
            action_type: action.config.action_type(),
            config: action.config.to_value(),
            delay_seconds: action.delay_seconds,
            continue_on_error: action.continue_on_error,
        }
    }
}

impl Action {
    pub fn new(config: ActionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            delay_seconds: 0,
            continue_on_error: false,
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.config.action_type()
    }

    pub fn with_delay(mut self, seconds: u32) -> Self {
        self.delay_seconds = seconds;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    pub fn assign_to_user(user_id: Uuid) -> Self {
        Self::new(ActionConfig::AssignTicket(AssignTicketConfig {
            assign_to_user_id: Some(user_id),
            ..Default::default()
        }))
    }

    pub fn assign_to_group(group_id: Uuid, method: AssignmentMethod) -> Self {
        Self::new(ActionConfig::AssignTicket(AssignTicketConfig {
            assign_to_group_id: Some(group_id),
            method,
            ..Default::default()
        }))
    }

    pub fn change_status(status: impl Into<String>) -> Self {
        Self::new(ActionConfig::ChangeStatus(ChangeStatusConfig { new_status: status.into() }))
    }

    pub fn change_priority(priority: impl Into<String>) -> Self {
        Self::new(ActionConfig::ChangePriority(ChangePriorityConfig {
            new_priority: priority.into(),
        }))
    }

    pub fn send_email(to: Vec<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(ActionConfig::SendEmail(SendEmailConfig {
            email_to: to,
            email_subject: subject.into(),
            email_body: body.into(),
        }))
    }

    pub fn send_notification(user_ids: Vec<Uuid>, text: impl Into<String>) -> Self {
        Self::new(ActionConfig::SendNotification(SendNotificationConfig {
            notify_user_ids: user_ids,
            notification_text: text.into(),
        }))
    }

    pub fn add_tag(tag: impl Into<String>) -> Self {
        Self::new(ActionConfig::AddTag(TagConfig { tags: vec![tag.into()] }))
    }

    pub fn remove_tag(tag: impl Into<String>) -> Self {
        Self::new(ActionConfig::RemoveTag(TagConfig { tags: vec![tag.into()] }))
    }

    pub fn add_note(content: impl Into<String>, internal: bool) -> Self {
        Self::new(ActionConfig::AddNote(AddNoteConfig {
            note_content: content.into(),
            note_is_internal: internal,
        }))
    }

    pub fn webhook(url: impl Into<String>) -> Self {
        Self::new(ActionConfig::WebhookCall(WebhookCallConfig {
            webhook_url: url.into(),
            webhook_method: None,
            webhook_headers: HashMap::new(),
            webhook_body: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "execution_status", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionEntry {
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    pub action_id: Uuid,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub ticket_id: Option<Uuid>,
    pub trigger_type: TriggerType,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actions_run: u32,
    pub actions_failed: u32,
    pub execution_log: Vec<WorkflowExecutionEntry>,
    pub error_message: Option<String>,
}

impl WorkflowExecution {
    pub fn start(workflow: &Workflow, trigger_type: TriggerType, ticket_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            ticket_id,
            trigger_type,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            actions_run: 0,
            actions_failed: 0,
            execution_log: Vec::new(),
            error_message: None,
        }
    }

    pub fn record_success(&mut self, action: &Action, duration_ms: i64, message: String) {
        self.actions_run += 1;
        self.execution_log.push(WorkflowExecutionEntry {
            timestamp: Utc::now(),
            action_type: action.action_type(),
            action_id: action.id,
            status: EntryStatus::Completed,
            message: Some(message),
            error: None,
            duration_ms,
        });
    }

    pub fn record_failure(&mut self, action: &Action, duration_ms: i64, error: String) {
        self.actions_failed += 1;
        self.execution_log.push(WorkflowExecutionEntry {
            timestamp: Utc::now(),
            action_type: action.action_type(),
            action_id: action.id,
            status: EntryStatus::Failed,
            message: None,
            error: Some(error),
            duration_ms,
        });
    }

    /// Marks a hard stop. The status is kept by [`WorkflowExecution::finalize`].
    pub fn fail(&mut self, error: String) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error);
    }

    pub fn finalize(&mut self, completed_at: DateTime<Utc>) {
        if self.status != ExecutionStatus::Failed {
            self.status = if self.actions_failed > 0 {
                ExecutionStatus::Partial
            } else {
                ExecutionStatus::Success
            };
        }
        self.completed_at = Some(completed_at);
    }

    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSchedule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub workflow_id: Uuid,
    #[serde(alias = "cron_expression")]
    pub cron_expr: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tickets and agents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub subject: String,
    pub status: String,
    pub priority: String,
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_group_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Vec<TicketNote>,
    #[serde(default)]
    pub escalation_level: u32,
    #[serde(default)]
    pub sla: Option<TicketSla>,
    #[serde(default)]
    pub custom_fields: HashMap<String, Value>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            status: "open".to_string(),
            priority: "medium".to_string(),
            assigned_user_id: None,
            assigned_group_id: None,
            tags: Vec::new(),
            notes: Vec::new(),
            escalation_level: 0,
            sla: None,
            custom_fields: HashMap::new(),
            updated_at: None,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketNote {
    pub id: Uuid,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketSla {
    pub policy_id: Option<Uuid>,
    pub response_due_at: Option<DateTime<Utc>>,
    pub resolution_due_at: Option<DateTime<Utc>>,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub open_tickets: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_decodes_typed_config() {
        let action: Action = serde_json::from_value(json!({
            "type": "assign_ticket",
            "config": { "assign_to_group_id": Uuid::nil(), "assignment_method": "round_robin" },
            "delay_seconds": 5,
            "continue_on_err": true
        }))
        .unwrap();

        assert_eq!(action.action_type(), ActionType::AssignTicket);
        assert_eq!(action.delay_seconds, 5);
        assert!(action.continue_on_error);
        match action.config {
            ActionConfig::AssignTicket(c) => {
                assert_eq!(c.method, AssignmentMethod::RoundRobin);
                assert_eq!(c.assign_to_group_id, Some(Uuid::nil()));
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_action_rejects_malformed_config() {
        let result: Result<Action, _> = serde_json::from_value(json!({
            "type": "change_status",
            "config": { "new_status": 42 }
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("change_status"), "{}", err);
    }

    #[test]
    fn test_action_serializes_with_type_tag() {
        let action = Action::change_status("closed").with_delay(3);
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "change_status");
        assert_eq!(value["config"]["new_status"], "closed");

        let back: Action = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_sla_minutes_are_bounded() {
        let sla = |response: i64| {
            ActionConfig::SetSla(SetSlaConfig {
                response_minutes: Some(response),
                ..Default::default()
            })
        };
        assert!(sla(240).validate().is_empty());
        assert!(sla(MAX_SLA_MINUTES).validate().is_empty());
        assert_eq!(sla(i64::MAX).validate(), vec![format!("response_minutes must be between 0 and {}", MAX_SLA_MINUTES)]);
        assert_eq!(sla(-5).validate().len(), 1);
    }

    #[test]
    fn test_escalate_accepts_missing_config() {
        let action: Action = serde_json::from_value(json!({ "type": "escalate" })).unwrap();
        assert_eq!(action.config, ActionConfig::Escalate(EscalateConfig::default()));
    }

    #[test]
    fn test_unknown_operator_decodes() {
        let condition: Condition =
            serde_json::from_value(json!({ "field": "x", "operator": "between", "value": 1 })).unwrap();
        assert_eq!(condition.operator, ConditionOperator::Unknown);
    }

    #[test]
    fn test_trigger_config_filters() {
        let workflow = Workflow::new("escalate on reopen").with_trigger(
            Trigger::new(TriggerType::StatusChanged).with_config(TriggerConfig {
                from_status: Some("resolved".into()),
                to_status: Some("open".into()),
                ..Default::default()
            }),
        );

        let mut ctx = WorkflowContext::new();
        ctx.insert("old_status".into(), json!("resolved"));
        ctx.insert("new_status".into(), json!("open"));
        assert!(workflow.is_triggered_by(TriggerType::StatusChanged, &ctx));
        assert!(!workflow.is_triggered_by(TriggerType::TicketCreated, &ctx));

        ctx.insert("new_status".into(), json!("closed"));
        assert!(!workflow.is_triggered_by(TriggerType::StatusChanged, &ctx));

        // missing keys never reject
        assert!(workflow.is_triggered_by(TriggerType::StatusChanged, &WorkflowContext::new()));
    }

    #[test]
    fn test_inactive_trigger_never_matches() {
        let workflow = Workflow::new("w").with_trigger(Trigger::new(TriggerType::TicketCreated).inactive());
        assert!(!workflow.is_triggered_by(TriggerType::TicketCreated, &WorkflowContext::new()));
    }

    #[test]
    fn test_execution_finalize() {
        let workflow = Workflow::new("w");
        let action = Action::add_tag("x");

        let mut execution = WorkflowExecution::start(&workflow, TriggerType::Manual, None);
        execution.record_success(&action, 1, "ok".into());
        execution.record_failure(&action, 1, "boom".into());
        execution.finalize(Utc::now());
        assert_eq!(execution.status, ExecutionStatus::Partial);

        let mut execution = WorkflowExecution::start(&workflow, TriggerType::Manual, None);
        execution.record_failure(&action, 1, "boom".into());
        execution.fail("boom".into());
        execution.finalize(Utc::now());
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.is_finished());
    }

    #[test]
    fn test_trigger_type_from_str() {
        assert_eq!("time_based_sla".parse::<TriggerType>().unwrap(), TriggerType::TimeBasedSla);
        assert!("nope".parse::<TriggerType>().is_err());
    }
}
