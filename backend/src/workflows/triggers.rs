// Workflow Triggers - incoming events and selection of the workflows they start

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ticketflow_shared::{Ticket, TriggerType, Workflow, WorkflowContext, WorkflowStatus};
use uuid::Uuid;

/// Source of the trigger event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    System,
    User(Uuid),
    Scheduler,
    #[default]
    Api,
}

/// An event that can start workflows.
///
/// Deserializes from `{"trigger": "...", "context": {...}}` as well as the
/// full form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    #[serde(alias = "trigger")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub context: WorkflowContext,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn into_context(value: Value) -> WorkflowContext {
    match value {
        Value::Object(map) => map,
        _ => WorkflowContext::new(),
    }
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, context: WorkflowContext, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            context,
            source,
            timestamp: Utc::now(),
        }
    }

    /// Create a ticket created event
    pub fn ticket_created(ticket: &Ticket, source: EventSource) -> Self {
        Self::new(
            TriggerType::TicketCreated,
            into_context(json!({
                "ticket_id": ticket.id.to_string(),
                "ticket": ticket,
                "subject": ticket.subject,
                "status": ticket.status,
                "priority": ticket.priority,
                "tags": ticket.tags,
            })),
            source,
        )
    }

    /// Create a ticket status changed event
    pub fn status_changed(ticket_id: Uuid, old_status: &str, new_status: &str, changed_by: Uuid) -> Self {
        Self::new(
            TriggerType::StatusChanged,
            into_context(json!({
                "ticket_id": ticket_id.to_string(),
                "old_status": old_status,
                "new_status": new_status,
                "changed_by": changed_by,
            })),
            EventSource::User(changed_by),
        )
    }

    /// Create a ticket priority changed event
    pub fn priority_changed(ticket_id: Uuid, old_priority: &str, new_priority: &str, changed_by: Uuid) -> Self {
        Self::new(
            TriggerType::PriorityChanged,
            into_context(json!({
                "ticket_id": ticket_id.to_string(),
                "old_priority": old_priority,
                "new_priority": new_priority,
                "changed_by": changed_by,
            })),
            EventSource::User(changed_by),
        )
    }

    /// Create a ticket assigned event
    pub fn ticket_assigned(ticket_id: Uuid, old_assignee: Option<Uuid>, new_assignee: Uuid, assigned_by: Uuid) -> Self {
        Self::new(
            TriggerType::TicketAssigned,
            into_context(json!({
                "ticket_id": ticket_id.to_string(),
                "old_assignee": old_assignee,
                "new_assignee": new_assignee,
                "assigned_by": assigned_by,
            })),
            EventSource::User(assigned_by),
        )
    }

    /// Create an SLA breach event
    pub fn sla_breach(ticket_id: Uuid, breach_type: &str, breach_minutes: i64) -> Self {
        Self::new(
            TriggerType::TimeBasedSla,
            into_context(json!({
                "ticket_id": ticket_id.to_string(),
                "breach_type": breach_type,
                "breach_minutes": breach_minutes,
            })),
            EventSource::System,
        )
    }

    /// Create a scheduled run event
    pub fn scheduled(workflow_id: Uuid, schedule_id: Uuid) -> Self {
        Self::new(
            TriggerType::Scheduled,
            into_context(json!({
                "workflow_id": workflow_id.to_string(),
                "schedule_id": schedule_id.to_string(),
                "scheduled_at": Utc::now(),
            })),
            EventSource::Scheduler,
        )
    }
}

impl TriggerEvent {
    /// Full ticket snapshot carried under `ticket`, if the event has one.
    pub fn ticket(&self) -> Option<Ticket> {
        self.context
            .get("ticket")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Active workflows triggered by the event, highest priority first.
///
/// The sort is stable: equal priorities keep their storage order.
pub fn select_workflows(workflows: Vec<Workflow>, trigger_type: TriggerType, context: &WorkflowContext) -> Vec<Workflow> {
    let mut selected: Vec<Workflow> = workflows
        .into_iter()
        .filter(|w| w.status == WorkflowStatus::Active && w.is_triggered_by(trigger_type, context))
        .collect();
    selected.sort_by(|a, b| b.priority.cmp(&a.priority));
    selected
}
