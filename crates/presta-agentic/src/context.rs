//! Per-request schema context assembly.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::ports::ContactDirectory;
use crate::schema::{allowed_tables, scope_rules, worked_examples, SchemaContext};

/// Upper bound on contacts embedded in a prompt context.
pub const MAX_CONTACTS: i64 = 50;

/// Assembles the immutable `SchemaContext` snapshot for one request.
///
/// The table definitions, scope rules and examples are static; only the
/// contact directory is read live, through the injected port.
pub struct ContextProvider {
    directory: Arc<dyn ContactDirectory>,
}

impl ContextProvider {
    pub fn new(directory: Arc<dyn ContactDirectory>) -> Self {
        Self { directory }
    }

    /// Build the snapshot for a tenant/caller pair.
    ///
    /// A directory failure is a hard error: without identity context no
    /// query can be safely generated.
    pub async fn build(&self, tenant_id: Uuid, caller_contact_id: Uuid) -> Result<SchemaContext> {
        let contacts = self
            .directory
            .list_contacts(tenant_id, MAX_CONTACTS)
            .await
            .map_err(|e| AgentError::ContextUnavailable(e.to_string()))?;

        tracing::debug!(
            %tenant_id,
            contact_count = contacts.len(),
            "assembled schema context"
        );

        Ok(SchemaContext {
            tables: allowed_tables(),
            scope_rules: scope_rules(tenant_id, caller_contact_id),
            tenant_id,
            caller_contact_id,
            contacts,
            examples: worked_examples(tenant_id, caller_contact_id),
            current_date: Utc::now().date_naive(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Contact;
    use async_trait::async_trait;

    struct FixedDirectory {
        contacts: Vec<Contact>,
    }

    #[async_trait]
    impl ContactDirectory for FixedDirectory {
        async fn list_contacts(&self, _tenant_id: Uuid, limit: i64) -> Result<Vec<Contact>> {
            Ok(self.contacts.iter().take(limit as usize).cloned().collect())
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl ContactDirectory for FailingDirectory {
        async fn list_contacts(&self, _tenant_id: Uuid, _limit: i64) -> Result<Vec<Contact>> {
            Err(AgentError::Execution("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_context_contains_only_directory_contacts() {
        let caty = Contact {
            id: Uuid::new_v4(),
            name: "Caty".to_string(),
        };
        let provider = ContextProvider::new(Arc::new(FixedDirectory {
            contacts: vec![caty.clone()],
        }));
        let context = provider.build(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        assert_eq!(context.contacts.len(), 1);
        assert_eq!(context.contacts[0].name, "Caty");
        // The rendered directory never mentions anyone outside the snapshot.
        assert_eq!(context.render_contacts(10).matches(" - ").count(), 1);
    }

    #[tokio::test]
    async fn test_directory_failure_is_hard_error() {
        let provider = ContextProvider::new(Arc::new(FailingDirectory));
        let err = provider
            .build(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ContextUnavailable(_)));
        assert!(!err.is_retryable());
    }
}
