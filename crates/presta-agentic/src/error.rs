use thiserror::Error;

/// Error taxonomy for the query agent.
///
/// Generation, execution and timeout failures are retryable inside the
/// orchestrator's attempt budget; context failures are hard errors because
/// no query can be safely generated without identity context.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("execution timed out")]
    Timeout,

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Whether the orchestrator may spend another attempt on this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(_) | Self::Execution(_) | Self::Timeout => true,
            Self::ContextUnavailable(_) | Self::Internal(_) => false,
        }
    }
}
