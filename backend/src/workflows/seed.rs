// Startup loading of workflow definitions, cron schedules, tickets and agents
// from JSON files

use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use ticketflow_shared::{Agent, Ticket, Workflow, WorkflowSchedule};
use tracing::info;
use uuid::Uuid;

use super::repository::{InMemoryAgentDirectory, InMemoryTicketRepository, WorkflowRepository};
use crate::error::{WorkflowError, WorkflowResult};
use crate::validation::validate_workflow;

async fn read_json<T: DeserializeOwned>(path: &Path) -> WorkflowResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| WorkflowError::Storage(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| WorkflowError::Storage(format!("failed to parse {}: {}", path.display(), e)))
}

/// Stores each definition as given, status included. Workflows whose id is
/// already present are skipped. Returns how many were created.
pub async fn seed_workflows(repository: &dyn WorkflowRepository, path: &Path) -> WorkflowResult<usize> {
    let definitions: Vec<Workflow> = read_json(path).await?;

    let mut created = 0;
    for workflow in definitions {
        match repository.get_by_id(workflow.id).await {
            Ok(_) => continue,
            Err(WorkflowError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let workflow = validate_workflow(workflow)?.into_inner();
        repository.create(&workflow).await?;
        created += 1;
    }

    info!(created, path = %path.display(), "Seeded workflows");
    Ok(created)
}

pub async fn load_schedules(path: &Path) -> WorkflowResult<Vec<WorkflowSchedule>> {
    read_json(path).await
}

/// Loads a JSON array of tickets into the store, replacing any with the
/// same id.
pub async fn seed_tickets(tickets: &InMemoryTicketRepository, path: &Path) -> WorkflowResult<usize> {
    let loaded: Vec<Ticket> = read_json(path).await?;
    let count = loaded.len();
    for ticket in loaded {
        tickets.insert(ticket).await;
    }
    info!(count, path = %path.display(), "Loaded tickets");
    Ok(count)
}

/// Loads agent groups keyed by group id. Returns the number of groups.
pub async fn seed_agents(agents: &InMemoryAgentDirectory, path: &Path) -> WorkflowResult<usize> {
    let groups: HashMap<Uuid, Vec<Agent>> = read_json(path).await?;
    let count = groups.len();
    for (group_id, members) in groups {
        agents.set_group(group_id, members).await;
    }
    info!(groups = count, path = %path.display(), "Loaded agent groups");
    Ok(count)
}
