//! LLM backend selection.

use std::str::FromStr;

/// Which provider the agent talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentBackend {
    Anthropic,
    OpenAi,
}

impl AgentBackend {
    /// Read `AGENT_BACKEND`; Anthropic unless `openai` is requested.
    pub fn from_env() -> Self {
        std::env::var("AGENT_BACKEND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::Anthropic)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl FromStr for AgentBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

impl std::fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
