//! Audit trail of AI-function invocations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use presta_agentic::error::{AgentError, Result};
use presta_agentic::ports::ActionAudit;

/// Postgres-backed audit store. Rate limiting counts these rows; callers
/// treat a count failure as a denial, so errors here propagate as-is.
pub struct PgActionAudit {
    pool: PgPool,
}

impl PgActionAudit {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionAudit for PgActionAudit {
    async fn record(&self, tenant_id: Uuid, contact_id: Uuid, function_name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_actions_audit (tenant_id, contact_id, function_name)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(tenant_id)
        .bind(contact_id)
        .bind(function_name)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Execution(e.to_string()))?;
        Ok(())
    }

    async fn count_since(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
        function_name: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM ai_actions_audit
            WHERE tenant_id = $1
              AND contact_id = $2
              AND function_name = $3
              AND created_at >= $4
            "#,
        )
        .bind(tenant_id)
        .bind(contact_id)
        .bind(function_name)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AgentError::Execution(e.to_string()))
    }
}
