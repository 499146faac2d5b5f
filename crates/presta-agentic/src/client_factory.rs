//! LLM client construction from environment configuration.

use std::sync::Arc;

use anyhow::Result;

use crate::anthropic_client::AnthropicClient;
use crate::backend::AgentBackend;
use crate::llm_client::LlmClient;
use crate::openai_client::OpenAiClient;

/// Create the generator's client for the configured backend.
pub fn create_llm_client() -> Result<Arc<dyn LlmClient>> {
    match AgentBackend::from_env() {
        AgentBackend::Anthropic => Ok(Arc::new(AnthropicClient::from_env()?)),
        AgentBackend::OpenAi => Ok(Arc::new(OpenAiClient::from_env()?)),
    }
}

/// Create a client for the configured backend with an explicit API key.
pub fn create_llm_client_with_key(api_key: String) -> Result<Arc<dyn LlmClient>> {
    match AgentBackend::from_env() {
        AgentBackend::Anthropic => Ok(Arc::new(AnthropicClient::new(api_key))),
        AgentBackend::OpenAi => Ok(Arc::new(OpenAiClient::new(api_key))),
    }
}

/// Create the reviewer's client: same backend, temperature pinned to 0.0
/// so the security review is as deterministic as the provider allows.
pub fn create_review_client() -> Result<Arc<dyn LlmClient>> {
    match AgentBackend::from_env() {
        AgentBackend::Anthropic => {
            Ok(Arc::new(AnthropicClient::from_env()?.with_temperature(0.0)))
        }
        AgentBackend::OpenAi => Ok(Arc::new(OpenAiClient::from_env()?.with_temperature(0.0))),
    }
}
