use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ticketflow::config::Config;
use ticketflow::database;
use ticketflow::jobs::WorkflowScheduler;
use ticketflow::services::{BroadcastNotificationService, EmailService, LogEmailService, SmtpEmailService};
use ticketflow::workflows::seed;
use ticketflow::workflows::triggers::TriggerEvent;
use ticketflow::workflows::{
    ActionDispatcher, InMemoryAgentDirectory, InMemoryTicketRepository, InMemoryWorkflowRepository,
    PgWorkflowRepository, WorkflowEngine, WorkflowRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let workflows: Arc<dyn WorkflowRepository> = match &config.database_url {
        Some(url) => {
            let pool = database::create_pool(url, &database::PoolConfig::from_env()).await?;
            database::migrate(&pool).await?;
            if !database::health_check(&pool).await {
                anyhow::bail!("database health check failed");
            }
            Arc::new(PgWorkflowRepository::new(pool))
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory workflow storage");
            Arc::new(InMemoryWorkflowRepository::new())
        }
    };

    let email: Arc<dyn EmailService> = if config.smtp.is_configured() {
        Arc::new(SmtpEmailService::new(&config.smtp))
    } else {
        tracing::warn!("SMTP not configured, emails will only be logged");
        Arc::new(LogEmailService)
    };
    let notifications = Arc::new(BroadcastNotificationService::default());

    let tickets = Arc::new(InMemoryTicketRepository::new());
    if let Some(path) = &config.tickets_path {
        seed::seed_tickets(&tickets, path).await?;
    }
    let agents = Arc::new(InMemoryAgentDirectory::new());
    if let Some(path) = &config.agents_path {
        seed::seed_agents(&agents, path).await?;
    }

    let dispatcher = ActionDispatcher::new(tickets.clone(), agents, email, notifications)
        .with_webhook_timeout(config.engine.webhook_timeout)?;

    let engine = Arc::new(WorkflowEngine::new(
        workflows.clone(),
        dispatcher,
        config.engine.pool.clone(),
    ));

    if let Some(path) = &config.workflows_path {
        seed::seed_workflows(workflows.as_ref(), path).await?;
    }

    let scheduler = WorkflowScheduler::new(engine.clone()).await?;
    if let Some(path) = &config.schedules_path {
        for schedule in &seed::load_schedules(path).await? {
            scheduler.register(schedule).await?;
        }
    }
    scheduler.start().await?;

    tracing::info!(
        workers = config.engine.pool.workers,
        queue_capacity = config.engine.pool.queue_capacity,
        overflow = %config.engine.pool.overflow,
        "Workflow engine ready, reading trigger events from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => handle_event(&engine, &tickets, &line).await,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    scheduler.shutdown().await?;
    engine.shutdown().await;

    let stats = engine.pool_stats();
    tracing::info!(
        submitted = stats.submitted,
        completed = stats.completed,
        rejected = stats.rejected,
        dropped = stats.dropped,
        "Workflow engine stopped"
    );
    Ok(())
}

async fn handle_event(engine: &WorkflowEngine, tickets: &InMemoryTicketRepository, line: &str) {
    let event: TriggerEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed trigger event");
            return;
        }
    };

    // Events that carry the ticket keep the local store current.
    if let Some(ticket) = event.ticket() {
        tickets.insert(ticket).await;
    }

    let event_id = event.event_id;
    match engine.process_event(event).await {
        Ok(dispatched) => tracing::info!(%event_id, dispatched = dispatched.len(), "Trigger processed"),
        Err(e) => tracing::error!(%event_id, error = %e, "Trigger dispatch failed"),
    }
}
