//! Environment-based configuration.

use anyhow::{anyhow, Result};

use presta_agentic::backend::AgentBackend;

/// Runtime configuration for the bot service. API keys and model overrides
/// are read by the LLM clients themselves.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub database_url: String,
    pub backend: AgentBackend,
}

impl BotConfig {
    /// Read configuration from the environment (after `dotenvy` has run).
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow!("DATABASE_URL environment variable not set"))?;
        Ok(Self {
            database_url,
            backend: AgentBackend::from_env(),
        })
    }
}
