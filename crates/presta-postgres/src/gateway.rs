//! Read-only execution gateway.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use presta_agentic::error::{AgentError, Result};
use presta_agentic::ports::{ExecutionResult, QueryGateway, Row};

/// Executes validated SQL exclusively through the `execute_readonly_query`
/// stored function, which re-validates the statement shape and caps rows
/// server-side. Each call carries a client-side timeout below the caller's
/// own budget.
pub struct PgQueryGateway {
    pool: PgPool,
    timeout: Duration,
}

impl PgQueryGateway {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn call_function(&self, sql: &str, max_rows: i64) -> Result<Vec<serde_json::Value>> {
        sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT * FROM execute_readonly_query($1, $2)",
        )
        .bind(sql)
        .bind(max_rows)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Execution(e.to_string()))
    }
}

#[async_trait]
impl QueryGateway for PgQueryGateway {
    async fn execute_readonly(&self, sql: &str, max_rows: i64) -> Result<ExecutionResult> {
        let values = tokio::time::timeout(self.timeout, self.call_function(sql, max_rows))
            .await
            .map_err(|_| AgentError::Timeout)??;

        tracing::debug!(row_count = values.len(), "read-only query executed");
        rows_from_json(values)
    }
}

/// Convert the function's jsonb rows into flat records; nested objects or
/// arrays are rejected rather than flattened silently.
fn rows_from_json(values: Vec<serde_json::Value>) -> Result<ExecutionResult> {
    let mut rows: Vec<Row> = Vec::with_capacity(values.len());
    for value in values {
        let object = match value {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(AgentError::Execution(format!(
                    "gateway returned a non-object row: {other}"
                )))
            }
        };
        for (column, field) in &object {
            if field.is_object() || field.is_array() {
                return Err(AgentError::Execution(format!(
                    "nested value in column {column}"
                )));
            }
        }
        rows.push(object);
    }
    Ok(ExecutionResult { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_rows_pass() {
        let result = rows_from_json(vec![
            json!({"name": "Caty", "amount": 15000}),
            json!({"name": "Juan", "amount": null}),
        ])
        .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0]["amount"], json!(15000));
    }

    #[test]
    fn test_nested_object_rejected() {
        let err = rows_from_json(vec![json!({"contact": {"id": 1}})]).unwrap_err();
        assert!(matches!(err, AgentError::Execution(_)));
        assert!(err.to_string().contains("nested value in column contact"));
    }

    #[test]
    fn test_nested_array_rejected() {
        let err = rows_from_json(vec![json!({"amounts": [1, 2]})]).unwrap_err();
        assert!(err.to_string().contains("amounts"));
    }

    #[test]
    fn test_non_object_row_rejected() {
        let err = rows_from_json(vec![json!(42)]).unwrap_err();
        assert!(err.to_string().contains("non-object row"));
    }

    #[test]
    fn test_empty_set_is_ok() {
        assert!(rows_from_json(vec![]).unwrap().is_empty());
    }
}
