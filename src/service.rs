//! The bot-facing `answer_question` boundary.

use std::sync::Arc;

use uuid::Uuid;

use presta_agentic::agent::{AnswerOutcome, SqlAgent};
use presta_agentic::context::ContextProvider;
use presta_agentic::error::Result;
use presta_agentic::format::ResponseShape;
use presta_agentic::ports::ActionAudit;

use crate::permissions::{self, QUERY_LOANS_DYNAMIC};

const DENIED_MESSAGE: &str =
    "Por ahora no puedo responder esa consulta. Intenta de nuevo más tarde.";

/// Service wrapper around the SQL agent: permission check, rate limit,
/// context assembly, agent run, audit record - in that order.
pub struct BotService {
    context_provider: ContextProvider,
    agent: SqlAgent,
    audit: Arc<dyn ActionAudit>,
}

impl BotService {
    pub fn new(context_provider: ContextProvider, agent: SqlAgent, audit: Arc<dyn ActionAudit>) -> Self {
        Self {
            context_provider,
            agent,
            audit,
        }
    }

    /// Answer one natural-language question for a caller.
    ///
    /// Denials (permissions, rate limit) surface as a generic clarification
    /// message, never as internal reasons; a failed context build is a hard
    /// error because no query can be generated without identity context.
    pub async fn answer_question(
        &self,
        tenant_id: Uuid,
        caller_contact_id: Uuid,
        question: &str,
        expected_shape: ResponseShape,
    ) -> Result<AnswerOutcome> {
        let check = permissions::check_permission(QUERY_LOANS_DYNAMIC, None);
        if !check.allowed {
            tracing::warn!(
                %tenant_id,
                reason = check.reason.as_deref().unwrap_or("unknown"),
                "dynamic query denied by permission registry"
            );
            return Ok(AnswerOutcome::Clarification {
                message: DENIED_MESSAGE.to_string(),
            });
        }

        let permission = permissions::find(QUERY_LOANS_DYNAMIC)
            .expect("dynamic query function is registered");
        let rate = permissions::check_rate_limit(
            self.audit.as_ref(),
            tenant_id,
            caller_contact_id,
            permission,
        )
        .await;
        if !rate.allowed {
            tracing::warn!(
                %tenant_id,
                %caller_contact_id,
                reason = rate.reason.as_deref().unwrap_or("unknown"),
                "dynamic query rate limited"
            );
            return Ok(AnswerOutcome::Clarification {
                message: DENIED_MESSAGE.to_string(),
            });
        }

        let context = self
            .context_provider
            .build(tenant_id, caller_contact_id)
            .await?;

        let outcome = self.agent.answer(question, &context, expected_shape).await;

        if let Err(e) = self
            .audit
            .record(tenant_id, caller_contact_id, QUERY_LOANS_DYNAMIC)
            .await
        {
            // The answer already exists; losing one audit row is logged,
            // not surfaced.
            tracing::warn!(error = %e, "failed to record audit row");
        }

        Ok(outcome)
    }
}
