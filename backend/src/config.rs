use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debugger::DebugConfig;
use crate::workflows::pool::{ExecutionPoolConfig, OverflowPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres storage when set, in-memory repositories otherwise.
    pub database_url: Option<String>,
    /// JSON file with workflow definitions loaded at startup.
    pub workflows_path: Option<PathBuf>,
    /// Cron schedules loaded at startup.
    pub schedules_path: Option<PathBuf>,
    /// Tickets preloaded into the in-memory ticket store.
    pub tickets_path: Option<PathBuf>,
    /// Agent groups (`{"<group id>": [agents]}`) for assignment actions.
    pub agents_path: Option<PathBuf>,
    pub engine: EngineConfig,
    pub debug: DebugConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pool: ExecutionPoolConfig,
    pub webhook_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: ExecutionPoolConfig::default(),
            webhook_timeout: Duration::from_secs(30),
        }
    }
}

/// SMTP configuration for sending emails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let pool_defaults = ExecutionPoolConfig::default();
        let debug_defaults = DebugConfig::default();

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            workflows_path: env::var("WORKFLOWS_PATH").ok().map(PathBuf::from),
            schedules_path: env::var("SCHEDULES_PATH").ok().map(PathBuf::from),
            tickets_path: env::var("TICKETS_PATH").ok().map(PathBuf::from),
            agents_path: env::var("AGENTS_PATH").ok().map(PathBuf::from),
            engine: EngineConfig {
                pool: ExecutionPoolConfig {
                    workers: env_or("WORKFLOW_WORKERS", pool_defaults.workers).max(1),
                    queue_capacity: env_or("WORKFLOW_QUEUE_CAPACITY", pool_defaults.queue_capacity).max(1),
                    overflow: env_or::<OverflowPolicy>("WORKFLOW_OVERFLOW_POLICY", pool_defaults.overflow),
                },
                webhook_timeout: Duration::from_secs(env_or("WEBHOOK_TIMEOUT_SECS", 30)),
            },
            debug: DebugConfig {
                test_timeout: Duration::from_secs(env_or(
                    "DEBUG_TEST_TIMEOUT_SECS",
                    debug_defaults.test_timeout.as_secs(),
                )),
                failure_rate: env_or("DEBUG_FAILURE_RATE", debug_defaults.failure_rate).clamp(0.0, 1.0),
                failure_seed: env_or("DEBUG_FAILURE_SEED", debug_defaults.failure_seed),
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_default(),
                port: env_or("SMTP_PORT", 587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_email: env::var("SMTP_FROM_EMAIL")
                    .unwrap_or_else(|_| "workflows@localhost".to_string()),
                from_name: env::var("SMTP_FROM_NAME")
                    .unwrap_or_else(|_| "Ticket Workflows".to_string()),
            },
        })
    }
}

impl SmtpConfig {
    /// Check if SMTP is properly configured
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}
