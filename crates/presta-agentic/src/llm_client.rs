//! LLM client abstraction shared by the generator and the reviewer.

use anyhow::Result;
use async_trait::async_trait;

/// Minimal chat surface over an LLM provider.
///
/// Both calls are single-turn (system + user); `chat_json` asks the provider
/// for a JSON-only response where the API supports it. Responses are always
/// treated as untrusted text and parsed defensively by the caller.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-text completion.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Completion constrained to a JSON object where the provider supports it.
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Model identifier in use.
    fn model_name(&self) -> &str;

    /// Provider name for logging.
    fn provider_name(&self) -> &str;
}
