//! Port traits the agent depends on.
//!
//! Adapters (Postgres, in-memory test doubles) implement these; the agent
//! core never talks to a database driver directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::schema::Contact;

/// One result row: column name → JSON value, flat by contract.
/// The gateway adapter rejects nested objects and arrays.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Rows returned by the read-only execution gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
}

impl ExecutionResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The only channel through which generated SQL may reach the database.
///
/// Implementations must route through a sandboxed read-only stored function
/// that re-validates the statement shape and caps rows server-side; the
/// application never opens a general-purpose SQL channel for model output.
#[async_trait]
pub trait QueryGateway: Send + Sync {
    async fn execute_readonly(&self, sql: &str, max_rows: i64) -> Result<ExecutionResult>;
}

/// Tenant-scoped contact lookup used to assemble the schema context.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// List the tenant's contacts ordered by name, capped at `limit`.
    async fn list_contacts(&self, tenant_id: Uuid, limit: i64) -> Result<Vec<Contact>>;
}

/// Audit trail of AI-function invocations, also the basis for rate limiting.
/// An explicit injected store - never process-global mutable state.
#[async_trait]
pub trait ActionAudit: Send + Sync {
    async fn record(&self, tenant_id: Uuid, contact_id: Uuid, function_name: &str) -> Result<()>;

    /// Count prior invocations of `function_name` by this caller since `since`.
    async fn count_since(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
        function_name: &str,
        since: DateTime<Utc>,
    ) -> Result<i64>;
}
