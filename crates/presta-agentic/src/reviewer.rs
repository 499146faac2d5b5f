//! Semantic/security review of candidate SQL.
//!
//! Second model pass, independent of the generator, configured as a strict
//! reviewer at low temperature. Its output is untrusted input: parsed
//! defensively, clamped, and re-gated by the orchestrator. Any transport or
//! parse failure yields a rejected verdict, never a crash - fail closed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client_factory::create_review_client;
use crate::generator::extract_json;
use crate::llm_client::LlmClient;
use crate::schema::SchemaContext;
use crate::validator::sanitize_for_logging;

/// The reviewer's judgement on one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// The reviewer's raw claim; the orchestrator re-derives approval from
    /// the confidence gate and never honors this flag alone.
    pub approved: bool,
    /// 0-100, clamped on parse.
    pub confidence: u8,
    pub issues: Vec<String>,
    pub suggested_fix: Option<String>,
    pub reasoning: String,
}

impl ReviewVerdict {
    /// Verdict used whenever the review itself fails: rejected, zero
    /// confidence, reason recorded.
    pub fn rejected(reason: String) -> Self {
        Self {
            approved: false,
            confidence: 0,
            issues: vec![reason],
            suggested_fix: None,
            reasoning: "review failed on a technical error".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    approved: bool,
    #[serde(default)]
    confidence: i64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggested_fix: Option<String>,
    #[serde(default)]
    reasoning: String,
}

/// Security reviewer using a second, independent LLM call.
pub struct SqlReviewer {
    client: Arc<dyn LlmClient>,
}

impl SqlReviewer {
    /// Create from environment variables (temperature pinned low).
    pub fn from_env() -> anyhow::Result<Self> {
        let client = create_review_client()?;
        Ok(Self { client })
    }

    /// Create with a specific LLM client
    pub fn with_client(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Review one candidate. Infallible by contract: failures become
    /// rejected verdicts.
    pub async fn review(
        &self,
        sql: &str,
        context: &SchemaContext,
        original_question: &str,
    ) -> ReviewVerdict {
        match self.call(sql, context, original_question).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    candidate = %sanitize_for_logging(sql),
                    "semantic review failed, rejecting"
                );
                ReviewVerdict::rejected(format!("review error: {e}"))
            }
        }
    }

    async fn call(
        &self,
        sql: &str,
        context: &SchemaContext,
        original_question: &str,
    ) -> anyhow::Result<ReviewVerdict> {
        let system_prompt = include_str!("prompts/reviewer_system.md");
        let user_prompt = build_review_prompt(sql, context, original_question);

        let response = self.client.chat_json(system_prompt, &user_prompt).await?;
        let json = extract_json(&response)
            .ok_or_else(|| anyhow::anyhow!("reviewer response contains no JSON object"))?;
        let raw: RawVerdict = serde_json::from_str(json)?;

        let verdict = ReviewVerdict {
            approved: raw.approved,
            confidence: raw.confidence.clamp(0, 100) as u8,
            issues: raw.issues,
            suggested_fix: raw.suggested_fix.filter(|fix| !fix.trim().is_empty()),
            reasoning: raw.reasoning,
        };

        tracing::debug!(
            approved = verdict.approved,
            confidence = verdict.confidence,
            issue_count = verdict.issues.len(),
            candidate = %sanitize_for_logging(sql),
            "semantic review verdict"
        );

        Ok(verdict)
    }
}

fn build_review_prompt(sql: &str, context: &SchemaContext, original_question: &str) -> String {
    let contacts: Vec<String> = context
        .contacts
        .iter()
        .map(|c| format!("{} ({})", c.name, c.id))
        .collect();

    format!(
        "ORIGINAL USER QUESTION:\n\"{original_question}\"\n\n\
         SQL TO VALIDATE:\n```sql\n{sql}\n```\n\n\
         DATABASE SCHEMA:\n\n\
         Permitted tables: {table_names}\n\n{tables}\
         SCOPE RULES IT MUST RESPECT:\n{rules}\n\n\
         USER CONTEXT:\n\
         - Tenant ID: {tenant}\n\
         - Current contact id: {caller}\n\
         - Known contacts: {contacts}\n\
         - Current date: {date}\n\n\
         VALIDATE THIS QUERY AND RESPOND IN JSON.",
        table_names = context.table_names().join(", "),
        tables = context.render_tables_compact(),
        rules = context.render_rules(),
        tenant = context.tenant_id,
        caller = context.caller_contact_id,
        contacts = contacts.join(", "),
        date = context.current_date,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{allowed_tables, scope_rules, worked_examples, SchemaContext};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use uuid::Uuid;

    struct CannedClient {
        response: anyhow::Result<String>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn chat(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            match &self.response {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
        async fn chat_json(&self, system: &str, user: &str) -> anyhow::Result<String> {
            self.chat(system, user).await
        }
        fn model_name(&self) -> &str {
            "canned"
        }
        fn provider_name(&self) -> &str {
            "test"
        }
    }

    fn context() -> SchemaContext {
        let tenant = Uuid::new_v4();
        let caller = Uuid::new_v4();
        SchemaContext {
            tables: allowed_tables(),
            scope_rules: scope_rules(tenant, caller),
            tenant_id: tenant,
            caller_contact_id: caller,
            contacts: vec![],
            examples: worked_examples(tenant, caller),
            current_date: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_review_parses_verdict() {
        let reviewer = SqlReviewer::with_client(Arc::new(CannedClient {
            response: Ok(r#"{"approved": true, "confidence": 97, "issues": [], "reasoning": "ok"}"#
                .to_string()),
        }));
        let verdict = reviewer.review("SELECT 1", &context(), "cuánto me deben").await;
        assert!(verdict.approved);
        assert_eq!(verdict.confidence, 97);
        assert!(verdict.suggested_fix.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_clamped() {
        let reviewer = SqlReviewer::with_client(Arc::new(CannedClient {
            response: Ok(r#"{"approved": true, "confidence": 250, "reasoning": "ok"}"#.to_string()),
        }));
        let verdict = reviewer.review("SELECT 1", &context(), "q").await;
        assert_eq!(verdict.confidence, 100);
    }

    #[tokio::test]
    async fn test_malformed_response_fails_closed() {
        let reviewer = SqlReviewer::with_client(Arc::new(CannedClient {
            response: Ok("LGTM, ship it".to_string()),
        }));
        let verdict = reviewer.review("SELECT 1", &context(), "q").await;
        assert!(!verdict.approved);
        assert_eq!(verdict.confidence, 0);
        assert!(!verdict.issues.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_fails_closed() {
        let reviewer = SqlReviewer::with_client(Arc::new(CannedClient {
            response: Err(anyhow::anyhow!("connection reset")),
        }));
        let verdict = reviewer.review("SELECT 1", &context(), "q").await;
        assert!(!verdict.approved);
        assert_eq!(verdict.confidence, 0);
    }

    #[tokio::test]
    async fn test_blank_suggested_fix_is_dropped() {
        let reviewer = SqlReviewer::with_client(Arc::new(CannedClient {
            response: Ok(
                r#"{"approved": false, "confidence": 85, "issues": ["x"], "suggested_fix": "  ", "reasoning": "r"}"#
                    .to_string(),
            ),
        }));
        let verdict = reviewer.review("SELECT 1", &context(), "q").await;
        assert!(verdict.suggested_fix.is_none());
    }
}
