//! Tenant-scoped contact directory.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use presta_agentic::error::{AgentError, Result};
use presta_agentic::ports::ContactDirectory;
use presta_agentic::schema::Contact;

/// Postgres-backed contact directory.
pub struct PgContactDirectory {
    pool: PgPool,
}

impl PgContactDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    name: String,
}

#[async_trait]
impl ContactDirectory for PgContactDirectory {
    async fn list_contacts(&self, tenant_id: Uuid, limit: i64) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT id, name
            FROM tenant_contacts
            WHERE tenant_id = $1
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::ContextUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| Contact {
                id: r.id,
                name: r.name,
            })
            .collect())
    }
}
