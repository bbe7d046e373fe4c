use fake::{Fake, Faker};
use ticketflow::workflows::triggers::{EventSource, TriggerEvent};
use ticketflow_shared::{
    Action, Agent, Condition, Ticket, Trigger, TriggerType, Workflow, WorkflowContext, WorkflowStatus,
};
use uuid::Uuid;

pub fn ticket() -> Ticket {
    Ticket::new(format!("{} ({})", Faker.fake::<String>(), (1000..9999).fake::<u32>()))
}

/// Context as produced by a ticket-created event.
pub fn ticket_context(ticket: &Ticket) -> WorkflowContext {
    TriggerEvent::ticket_created(ticket, EventSource::System).context
}

/// Active workflow fired by `ticket_created`.
pub fn active_workflow(name: &str, priority: i32) -> Workflow {
    Workflow::new(name)
        .with_priority(priority)
        .with_status(WorkflowStatus::Active)
        .with_trigger(Trigger::new(TriggerType::TicketCreated))
}

/// Valid draft definition suitable for `create_workflow`.
pub fn draft_definition() -> Workflow {
    Workflow::new(format!("Workflow {}", (1..10_000).fake::<u32>()))
        .with_trigger(Trigger::new(TriggerType::TicketCreated))
        .with_condition(Condition::equals("priority", "high"))
        .with_action(Action::add_tag("auto"))
}

pub fn agent(open_tickets: u32, skills: &[&str]) -> Agent {
    Agent {
        id: Uuid::new_v4(),
        name: Faker.fake(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        open_tickets,
        is_active: true,
    }
}
