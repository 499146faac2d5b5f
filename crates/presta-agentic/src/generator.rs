//! SQL Generator
//!
//! Uses the LLM API (Anthropic or OpenAI) to turn a natural-language
//! question into one candidate SQL statement plus an explanation.

use std::sync::Arc;

use serde::Deserialize;

use crate::client_factory::create_llm_client;
use crate::error::AgentError;
use crate::llm_client::LlmClient;
use crate::schema::SchemaContext;
use crate::validator::{estimate_complexity, sanitize_for_logging, QueryComplexity};

/// Questions longer than this are rejected before any tokens are spent.
const MAX_QUESTION_LEN: usize = 500;

/// One candidate produced by the model, not yet trusted.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    pub sql: String,
    pub explanation: String,
    /// Derived locally from the SQL text, never asked of the model.
    pub complexity: QueryComplexity,
}

/// SQL generator using the LLM API
pub struct SqlGenerator {
    client: Arc<dyn LlmClient>,
}

#[derive(Deserialize)]
struct RawGeneration {
    sql: String,
    #[serde(default)]
    explanation: String,
}

impl SqlGenerator {
    /// Create from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let client = create_llm_client()?;
        Ok(Self { client })
    }

    /// Create with a specific LLM client
    pub fn with_client(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Generate one candidate for the question.
    ///
    /// `feedback` carries the reason a prior candidate was rejected; the
    /// model sees it as corrective context. Malformed model output is a
    /// retryable `AgentError::Generation`, never a panic.
    pub async fn generate(
        &self,
        question: &str,
        context: &SchemaContext,
        feedback: Option<&str>,
    ) -> Result<GeneratedSql, AgentError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::Generation("empty question".to_string()));
        }
        if question.len() > MAX_QUESTION_LEN {
            return Err(AgentError::Generation(format!(
                "question too long ({} chars, max {MAX_QUESTION_LEN})",
                question.len()
            )));
        }

        let system_prompt = include_str!("prompts/generator_system.md");
        let user_prompt = build_user_prompt(question, context, feedback);

        let response = self
            .client
            .chat_json(system_prompt, &user_prompt)
            .await
            .map_err(|e| AgentError::Generation(e.to_string()))?;

        let json = extract_json(&response).ok_or_else(|| {
            AgentError::Generation("generator response contains no JSON object".to_string())
        })?;

        let raw: RawGeneration = serde_json::from_str(json).map_err(|e| {
            AgentError::Generation(format!("generator response did not parse: {e}"))
        })?;

        let sql = raw.sql.trim().to_string();
        if sql.is_empty() {
            return Err(AgentError::Generation(
                "generator response has an empty \"sql\" field".to_string(),
            ));
        }

        let complexity = estimate_complexity(&sql);
        tracing::debug!(
            model = self.client.model_name(),
            %complexity,
            candidate = %sanitize_for_logging(&sql),
            "generated candidate SQL"
        );

        Ok(GeneratedSql {
            sql,
            explanation: if raw.explanation.is_empty() {
                "generated SQL".to_string()
            } else {
                raw.explanation
            },
            complexity,
        })
    }
}

fn build_user_prompt(question: &str, context: &SchemaContext, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "USER QUESTION:\n\"{question}\"\n\n\
         DATABASE SCHEMA:\n\n{tables}\n\
         USER CONTEXT:\n\
         - Tenant ID: {tenant} (MANDATORY in WHERE)\n\
         - Current contact: {caller}\n\
         - Known contacts:\n{contacts}\n\
         - Current date: {date}\n\n\
         SCOPE RULES (MUST be respected):\n{rules}\n\n\
         SIMILAR QUERY EXAMPLES:\n\n{examples}\n",
        tables = context.render_tables(),
        tenant = context.tenant_id,
        caller = context.caller_contact_id,
        contacts = context.render_contacts(10),
        date = context.current_date,
        rules = context.render_rules(),
        examples = context.render_examples(),
    );

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\nTHE PREVIOUS ATTEMPT WAS REJECTED:\n{feedback}\n\nFix the problem in this attempt.\n"
        ));
    }

    prompt.push_str("\nNow generate the SQL answering the user's question. Respond in JSON.");
    prompt
}

/// Pull the JSON object out of a possibly fenced, possibly chatty response.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    let inner = if let Some(rest) = text.split("```json").nth(1) {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some(rest) = text.split("```").nth(1) {
        rest.split("```").next().unwrap_or(rest)
    } else {
        text
    };
    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&inner[start..=end])
}
