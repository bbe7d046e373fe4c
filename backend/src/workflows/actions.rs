// Workflow Actions - per-type handlers invoked by the executor

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use ticketflow_shared::{
    Action, ActionConfig, AddNoteConfig, Agent, AssignTicketConfig, AssignmentMethod, ChangePriorityConfig,
    ChangeStatusConfig, EscalateConfig, SendEmailConfig, SendNotificationConfig, SetSlaConfig, TagConfig, Ticket,
    TicketNote, TicketSla, UpdateCustomFieldConfig, WebhookCallConfig, WorkflowContext,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::repository::{AgentDirectory, TicketRepository};
use super::templates::TemplateResolver;
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::{EmailService, NotificationService};

/// What a successful handler reports back for the execution log.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub message: String,
    pub output: Value,
}

impl ActionOutcome {
    fn new(message: impl Into<String>, output: Value) -> Self {
        Self {
            message: message.into(),
            output,
        }
    }
}

/// Reads the ticket id the event context carries.
pub fn context_ticket_id(context: &WorkflowContext) -> Option<Uuid> {
    context
        .get("ticket_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

pub struct ActionDispatcher {
    tickets: Arc<dyn TicketRepository>,
    agents: Arc<dyn AgentDirectory>,
    email: Arc<dyn EmailService>,
    notifications: Arc<dyn NotificationService>,
    http: reqwest::Client,
    round_robin: Mutex<HashMap<Uuid, usize>>,
}

impl ActionDispatcher {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        agents: Arc<dyn AgentDirectory>,
        email: Arc<dyn EmailService>,
        notifications: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            tickets,
            agents,
            email,
            notifications,
            http: reqwest::Client::new(),
            round_robin: Mutex::new(HashMap::new()),
        }
    }

    /// Bounds outgoing webhook calls.
    pub fn with_webhook_timeout(mut self, timeout: Duration) -> WorkflowResult<Self> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkflowError::Storage(format!("failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    pub async fn dispatch(&self, action: &Action, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        debug!(action_id = %action.id, action_type = %action.action_type(), "Dispatching action");

        match &action.config {
            ActionConfig::AssignTicket(config) => self.assign_ticket(config, context).await,
            ActionConfig::ChangeStatus(config) => self.change_status(config, context).await,
            ActionConfig::ChangePriority(config) => self.change_priority(config, context).await,
            ActionConfig::SendEmail(config) => self.send_email(config, context).await,
            ActionConfig::SendNotification(config) => self.send_notification(config, context).await,
            ActionConfig::AddTag(config) => self.add_tags(config, context).await,
            ActionConfig::RemoveTag(config) => self.remove_tags(config, context).await,
            ActionConfig::AddNote(config) => self.add_note(config, context).await,
            ActionConfig::Escalate(config) => self.escalate(config, context).await,
            ActionConfig::WebhookCall(config) => self.call_webhook(config, context).await,
            ActionConfig::SetSla(config) => self.set_sla(config, context).await,
            ActionConfig::UpdateCustomField(config) => self.update_custom_field(config, context).await,
        }
    }

    async fn load_ticket(&self, context: &WorkflowContext) -> WorkflowResult<Ticket> {
        let ticket_id = context_ticket_id(context)
            .ok_or_else(|| WorkflowError::ActionExecution("ticket_id not found in context".to_string()))?;
        self.tickets.get_by_id(ticket_id).await
    }

    async fn save_ticket(&self, mut ticket: Ticket) -> WorkflowResult<()> {
        ticket.touch();
        self.tickets.update(&ticket).await
    }

    async fn assign_ticket(&self, config: &AssignTicketConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;

        if config.method == AssignmentMethod::Direct {
            let outcome = if let Some(user_id) = config.assign_to_user_id {
                ticket.assigned_user_id = Some(user_id);
                ActionOutcome::new(format!("Ticket assigned to user {}", user_id), json!({ "assigned_to": user_id }))
            } else if let Some(group_id) = config.assign_to_group_id {
                ticket.assigned_group_id = Some(group_id);
                ActionOutcome::new(
                    format!("Ticket assigned to group {}", group_id),
                    json!({ "assigned_group": group_id }),
                )
            } else {
                return Err(WorkflowError::ActionConfig(
                    "assign_to_user_id or assign_to_group_id is required".to_string(),
                ));
            };
            self.save_ticket(ticket).await?;
            return Ok(outcome);
        }

        let group_id = config.assign_to_group_id.ok_or_else(|| {
            WorkflowError::ActionConfig(format!("{} assignment requires assign_to_group_id", config.method.as_str()))
        })?;

        let agents: Vec<Agent> = self
            .agents
            .group_members(group_id)
            .await?
            .into_iter()
            .filter(|a| a.is_active)
            .collect();
        if agents.is_empty() {
            return Err(WorkflowError::ActionExecution(format!("No active agents in group {}", group_id)));
        }

        let agent = match config.method {
            AssignmentMethod::RoundRobin => self.next_round_robin(group_id, &agents),
            AssignmentMethod::LeastLoaded => least_loaded(&agents),
            AssignmentMethod::SkillsBased => {
                let required = if config.required_skills.is_empty() {
                    &ticket.tags
                } else {
                    &config.required_skills
                };
                best_skill_match(&agents, required)?
            }
            AssignmentMethod::Direct => {
                return Err(WorkflowError::ActionConfig("direct assignment does not pick from a group".to_string()));
            }
        };

        let agent_id = agent.id;
        let agent_name = agent.name.clone();
        ticket.assigned_user_id = Some(agent_id);
        ticket.assigned_group_id = Some(group_id);
        self.save_ticket(ticket).await?;

        info!(%agent_id, method = config.method.as_str(), "Ticket assigned");
        Ok(ActionOutcome::new(
            format!("Ticket assigned to {} ({})", agent_name, config.method.as_str()),
            json!({ "assigned_to": agent_id, "method": config.method.as_str() }),
        ))
    }

    fn next_round_robin<'a>(&self, group_id: Uuid, agents: &'a [Agent]) -> &'a Agent {
        let mut cursors = self.round_robin.lock().unwrap_or_else(PoisonError::into_inner);
        let cursor = cursors.entry(group_id).or_insert(0);
        let agent = &agents[*cursor % agents.len()];
        *cursor = (*cursor + 1) % agents.len();
        agent
    }

    async fn change_status(&self, config: &ChangeStatusConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        let new_status = TemplateResolver::resolve(&config.new_status, context);
        let old_status = std::mem::replace(&mut ticket.status, new_status.clone());
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new(
            format!("Status changed from {} to {}", old_status, new_status),
            json!({ "old_status": old_status, "new_status": new_status }),
        ))
    }

    async fn change_priority(&self, config: &ChangePriorityConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        let new_priority = TemplateResolver::resolve(&config.new_priority, context);
        let old_priority = std::mem::replace(&mut ticket.priority, new_priority.clone());
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new(
            format!("Priority changed from {} to {}", old_priority, new_priority),
            json!({ "old_priority": old_priority, "new_priority": new_priority }),
        ))
    }

    async fn send_email(&self, config: &SendEmailConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let to: Vec<String> = config
            .email_to
            .iter()
            .map(|addr| TemplateResolver::resolve(addr, context))
            .collect();
        let subject = TemplateResolver::resolve(&config.email_subject, context);
        let body = TemplateResolver::resolve(&config.email_body, context);

        self.email.send_email(&to, &subject, &body).await?;

        Ok(ActionOutcome::new(
            format!("Email sent to {}", to.join(", ")),
            json!({ "to": to, "subject": subject }),
        ))
    }

    /// Individual delivery failures are logged; the action fails only when
    /// no recipient could be notified.
    async fn send_notification(
        &self,
        config: &SendNotificationConfig,
        context: &WorkflowContext,
    ) -> WorkflowResult<ActionOutcome> {
        let text = TemplateResolver::resolve(&config.notification_text, context);
        let mut delivered = Vec::new();
        let mut last_error = None;

        for user_id in &config.notify_user_ids {
            match self.notifications.send_notification(*user_id, &text).await {
                Ok(()) => delivered.push(*user_id),
                Err(e) => {
                    warn!(%user_id, error = %e, "Failed to notify user");
                    last_error = Some(e);
                }
            }
        }

        if delivered.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }

        Ok(ActionOutcome::new(
            format!("Notified {} of {} users", delivered.len(), config.notify_user_ids.len()),
            json!({ "notified": delivered }),
        ))
    }

    async fn add_tags(&self, config: &TagConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        let mut added = Vec::new();
        for tag in &config.tags {
            let tag = TemplateResolver::resolve(tag, context);
            if !ticket.tags.contains(&tag) {
                ticket.tags.push(tag.clone());
                added.push(tag);
            }
        }
        let tags = ticket.tags.clone();
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new(
            format!("Added tags: {}", added.join(", ")),
            json!({ "added": added, "tags": tags }),
        ))
    }

    async fn remove_tags(&self, config: &TagConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        let remove: Vec<String> = config.tags.iter().map(|t| TemplateResolver::resolve(t, context)).collect();
        ticket.tags.retain(|t| !remove.contains(t));
        let tags = ticket.tags.clone();
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new(
            format!("Removed tags: {}", remove.join(", ")),
            json!({ "removed": remove, "tags": tags }),
        ))
    }

    async fn add_note(&self, config: &AddNoteConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        let note = TicketNote {
            id: Uuid::new_v4(),
            content: TemplateResolver::resolve(&config.note_content, context),
            is_internal: config.note_is_internal,
            created_at: Utc::now(),
        };
        let note_id = note.id;
        ticket.notes.push(note);
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new(
            "Note added",
            json!({ "note_id": note_id, "internal": config.note_is_internal }),
        ))
    }

    async fn escalate(&self, config: &EscalateConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        ticket.escalation_level += 1;
        if let Some(user_id) = config.escalate_to_user_id {
            ticket.assigned_user_id = Some(user_id);
        }
        if let Some(group_id) = config.escalate_to_group_id {
            ticket.assigned_group_id = Some(group_id);
        }

        let reason = config
            .reason
            .as_deref()
            .map(|r| TemplateResolver::resolve(r, context))
            .unwrap_or_else(|| "Escalated by workflow".to_string());
        ticket.notes.push(TicketNote {
            id: Uuid::new_v4(),
            content: format!("Ticket escalated: {}", reason),
            is_internal: true,
            created_at: Utc::now(),
        });
        let level = ticket.escalation_level;
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new(
            format!("Ticket escalated to level {}", level),
            json!({ "escalation_level": level, "reason": reason }),
        ))
    }

    async fn call_webhook(&self, config: &WebhookCallConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let method_name = config.webhook_method.as_deref().unwrap_or("POST").to_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| WorkflowError::ActionConfig(format!("unsupported HTTP method '{}'", method_name)))?;
        let url = TemplateResolver::resolve(&config.webhook_url, context);

        let mut request = self.http.request(method, &url);
        for (name, value) in &config.webhook_headers {
            request = request.header(name.as_str(), TemplateResolver::resolve(value, context));
        }
        request = match &config.webhook_body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(TemplateResolver::resolve(body, context)),
            None => request.json(context),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::ActionExecution(format!(
                "Webhook {} returned status {}",
                url, status
            )));
        }

        Ok(ActionOutcome::new(
            format!("Webhook {} {} returned {}", method_name, url, status.as_u16()),
            json!({ "url": url, "status_code": status.as_u16() }),
        ))
    }

    async fn set_sla(&self, config: &SetSlaConfig, context: &WorkflowContext) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        let now = Utc::now();
        let sla = TicketSla {
            policy_id: config.sla_policy_id,
            response_due_at: due_after(now, config.response_minutes, "response_minutes")?,
            resolution_due_at: due_after(now, config.resolution_minutes, "resolution_minutes")?,
            applied_at: now,
        };
        let output = json!({
            "policy_id": sla.policy_id,
            "response_due_at": sla.response_due_at,
            "resolution_due_at": sla.resolution_due_at,
        });
        ticket.sla = Some(sla);
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new("SLA applied", output))
    }

    async fn update_custom_field(
        &self,
        config: &UpdateCustomFieldConfig,
        context: &WorkflowContext,
    ) -> WorkflowResult<ActionOutcome> {
        let mut ticket = self.load_ticket(context).await?;
        let value = TemplateResolver::resolve_value(&config.custom_field_value, context);
        ticket
            .custom_fields
            .insert(config.custom_field_name.clone(), value.clone());
        self.save_ticket(ticket).await?;

        Ok(ActionOutcome::new(
            format!("Custom field {} updated", config.custom_field_name),
            json!({ "field": config.custom_field_name, "value": value }),
        ))
    }
}

fn least_loaded(agents: &[Agent]) -> &Agent {
    let mut best = &agents[0];
    for agent in &agents[1..] {
        if agent.open_tickets < best.open_tickets {
            best = agent;
        }
    }
    best
}

/// Most matching skills wins; ties go to the least loaded agent.
fn best_skill_match<'a>(agents: &'a [Agent], required: &[String]) -> WorkflowResult<&'a Agent> {
    let score = |agent: &Agent| {
        agent
            .skills
            .iter()
            .filter(|skill| required.iter().any(|r| r.eq_ignore_ascii_case(skill)))
            .count()
    };

    let mut best: Option<(&Agent, usize)> = None;
    for agent in agents {
        let matched = score(agent);
        if matched == 0 {
            continue;
        }
        best = match best {
            Some((current, current_score))
                if current_score > matched
                    || (current_score == matched && current.open_tickets <= agent.open_tickets) =>
            {
                Some((current, current_score))
            }
            _ => Some((agent, matched)),
        };
    }

    best.map(|(agent, _)| agent)
        .ok_or_else(|| WorkflowError::ActionExecution("No agent found with matching skills".to_string()))
}

/// Deadline `minutes` after `now`. Values chrono cannot represent are a
/// config error rather than a panic.
fn due_after(now: DateTime<Utc>, minutes: Option<i64>, field: &str) -> WorkflowResult<Option<DateTime<Utc>>> {
    minutes
        .map(|m| {
            chrono::Duration::try_minutes(m)
                .and_then(|delta| now.checked_add_signed(delta))
                .ok_or_else(|| WorkflowError::ActionConfig(format!("{} of {} is out of range", field, m)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, skills: &[&str], open_tickets: u32) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            open_tickets,
            is_active: true,
        }
    }

    #[test]
    fn test_least_loaded_prefers_first_on_tie() {
        let agents = vec![agent("a", &[], 3), agent("b", &[], 1), agent("c", &[], 1)];
        assert_eq!(least_loaded(&agents).name, "b");
    }

    #[test]
    fn test_skill_match_prefers_coverage_then_load() {
        let agents = vec![
            agent("net", &["network"], 0),
            agent("both", &["network", "vpn"], 5),
            agent("both-idle", &["Network", "VPN"], 2),
        ];
        let required = vec!["network".to_string(), "vpn".to_string()];
        assert_eq!(best_skill_match(&agents, &required).unwrap().name, "both-idle");
    }

    #[test]
    fn test_skill_match_without_candidates_fails() {
        let agents = vec![agent("a", &["printers"], 0)];
        let err = best_skill_match(&agents, &["vpn".to_string()]).unwrap_err();
        assert!(err.to_string().contains("No agent found with matching skills"));
    }

    #[test]
    fn test_due_after_rejects_out_of_range_minutes() {
        let now = Utc::now();
        assert_eq!(due_after(now, None, "response_minutes").unwrap(), None);
        assert_eq!(
            due_after(now, Some(30), "response_minutes").unwrap(),
            Some(now + chrono::Duration::minutes(30))
        );
        let err = due_after(now, Some(i64::MAX), "resolution_minutes").unwrap_err();
        assert!(matches!(err, WorkflowError::ActionConfig(_)));
        assert!(err.to_string().contains("resolution_minutes"));
    }

    #[test]
    fn test_context_ticket_id() {
        let id = Uuid::new_v4();
        let mut ctx = WorkflowContext::new();
        assert_eq!(context_ticket_id(&ctx), None);
        ctx.insert("ticket_id".into(), json!(id.to_string()));
        assert_eq!(context_ticket_id(&ctx), Some(id));
    }
}
