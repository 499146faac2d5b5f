//! Fixed table allow-list, row-scope rules and few-shot examples.
//!
//! The permitted schema is hard-coded, not discovered: the allow-list is
//! closed by construction. Every rule that mentions the caller's identifiers
//! is phrased so compliance can be checked against the SQL text alone.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tables the generated SQL may reference. Anything else is rejected by name.
pub const ALLOWED_TABLES: [&str; 3] = ["agreements", "tenant_contacts", "contact_profiles"];

/// One column of an allow-listed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub ty: String,
    pub nullable: bool,
    pub description: String,
}

/// A documented foreign-key relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references: String,
    pub description: String,
}

/// Definition of one allow-listed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub description: String,
    pub columns: Vec<TableColumn>,
    pub primary_key: String,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Worked question→SQL pair for in-context learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlExample {
    pub question: String,
    pub sql: String,
    pub explanation: String,
}

/// One entry of the caller's contact directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
}

/// Immutable per-request snapshot handed to the generator and the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContext {
    pub tables: Vec<TableSchema>,
    pub scope_rules: Vec<String>,
    pub tenant_id: Uuid,
    pub caller_contact_id: Uuid,
    pub contacts: Vec<Contact>,
    pub examples: Vec<SqlExample>,
    pub current_date: NaiveDate,
}

fn column(name: &str, ty: &str, nullable: bool, description: &str) -> TableColumn {
    TableColumn {
        name: name.to_string(),
        ty: ty.to_string(),
        nullable,
        description: description.to_string(),
    }
}

fn foreign_key(column: &str, references: &str, description: &str) -> ForeignKey {
    ForeignKey {
        column: column.to_string(),
        references: references.to_string(),
        description: description.to_string(),
    }
}

/// The full allow-listed schema, static by design.
pub fn allowed_tables() -> Vec<TableSchema> {
    vec![
        TableSchema {
            name: "agreements".to_string(),
            description: "Loans and agreements between the user and their contacts".to_string(),
            columns: vec![
                column("id", "UUID", false, "Unique id of the agreement"),
                column("tenant_id", "UUID", false, "Tenant id (MANDATORY in WHERE)"),
                column(
                    "tenant_contact_id",
                    "UUID",
                    false,
                    "Contact receiving the loan (borrower)",
                ),
                column(
                    "lender_tenant_contact_id",
                    "UUID",
                    false,
                    "Contact granting the loan (lender)",
                ),
                column(
                    "type",
                    "agreement_type",
                    false,
                    "Agreement type: 'loan' or 'service'",
                ),
                column(
                    "status",
                    "agreement_status",
                    false,
                    "Lifecycle: 'active', 'completed' or 'cancelled'",
                ),
                column("amount", "NUMERIC", false, "Loan amount in Chilean pesos"),
                column("due_date", "DATE", true, "Due date of the loan"),
                column("description", "TEXT", true, "Free-text notes"),
                column("created_at", "TIMESTAMPTZ", false, "Record creation time"),
            ],
            primary_key: "id".to_string(),
            foreign_keys: vec![
                foreign_key("tenant_id", "tenants(id)", "Owning tenant"),
                foreign_key(
                    "tenant_contact_id",
                    "tenant_contacts(id)",
                    "Contact receiving the loan (borrower)",
                ),
                foreign_key(
                    "lender_tenant_contact_id",
                    "tenant_contacts(id)",
                    "Contact granting the loan (lender)",
                ),
            ],
        },
        TableSchema {
            name: "tenant_contacts".to_string(),
            description: "The tenant's contacts (includes the user themselves)".to_string(),
            columns: vec![
                column("id", "UUID", false, "Unique id of the contact within the tenant"),
                column("tenant_id", "UUID", false, "Tenant id (MANDATORY in WHERE)"),
                column(
                    "contact_profile_id",
                    "UUID",
                    false,
                    "Reference to the contact's global profile",
                ),
                column("name", "VARCHAR", false, "Contact name as the tenant knows them"),
                column("nickname", "VARCHAR", true, "Short name or alias"),
                column("created_at", "TIMESTAMPTZ", false, "Record creation time"),
            ],
            primary_key: "id".to_string(),
            foreign_keys: vec![
                foreign_key("tenant_id", "tenants(id)", "Owning tenant"),
                foreign_key(
                    "contact_profile_id",
                    "contact_profiles(id)",
                    "Global profile of the contact",
                ),
            ],
        },
        TableSchema {
            name: "contact_profiles".to_string(),
            description: "Global contact profiles (shared across tenants)".to_string(),
            columns: vec![
                column("id", "UUID", false, "Unique id of the profile"),
                column("phone_e164", "VARCHAR", true, "Phone in E.164 format (+56912345678)"),
                column("telegram_id", "BIGINT", true, "Telegram id"),
                column("created_at", "TIMESTAMPTZ", false, "Record creation time"),
            ],
            primary_key: "id".to_string(),
            foreign_keys: vec![],
        },
    ]
}

/// Row-scope rules the generated SQL must structurally satisfy, rendered
/// with the live identifiers so each one is checkable by text inspection.
pub fn scope_rules(tenant_id: Uuid, caller_contact_id: Uuid) -> Vec<String> {
    vec![
        format!("CRITICAL: every query MUST filter tenant_id = '{tenant_id}'"),
        format!("The current user is the contact with id = '{caller_contact_id}'"),
        format!(
            "Loans I GRANTED (they owe me / \"me deben\"): lender_tenant_contact_id = '{caller_contact_id}'"
        ),
        format!(
            "Loans I RECEIVED (I owe / \"debo\"): tenant_contact_id = '{caller_contact_id}'"
        ),
        "Only these tables may be queried: agreements, tenant_contacts, contact_profiles"
            .to_string(),
        "Never join against: users, tenants, whatsapp_messages, auth.*".to_string(),
        "status = 'active' means outstanding loans, status = 'completed' means repaid".to_string(),
        "due_date < CURRENT_DATE means the loan is overdue".to_string(),
        "type = 'loan' filters loans only (not services)".to_string(),
    ]
}

/// Worked examples for in-context learning, rendered with the live identifiers.
pub fn worked_examples(tenant_id: Uuid, caller_contact_id: Uuid) -> Vec<SqlExample> {
    vec![
        SqlExample {
            question: "cuánto me deben en total".to_string(),
            sql: format!(
                "SELECT SUM(amount) AS total_owed\n\
                 FROM agreements\n\
                 WHERE tenant_id = '{tenant_id}'\n  \
                 AND type = 'loan'\n  \
                 AND status = 'active'\n  \
                 AND lender_tenant_contact_id = '{caller_contact_id}'"
            ),
            explanation: "Sum of active loans where I am the lender".to_string(),
        },
        SqlExample {
            question: "cuánto le debo a Caty".to_string(),
            sql: format!(
                "SELECT SUM(a.amount) AS total_owed\n\
                 FROM agreements a\n\
                 JOIN tenant_contacts tc ON tc.id = a.lender_tenant_contact_id\n\
                 WHERE a.tenant_id = '{tenant_id}'\n  \
                 AND a.type = 'loan'\n  \
                 AND a.status = 'active'\n  \
                 AND a.tenant_contact_id = '{caller_contact_id}'\n  \
                 AND tc.name ILIKE '%caty%'"
            ),
            explanation: "Sum of loans where Caty is the lender and I am the borrower".to_string(),
        },
        SqlExample {
            question: "préstamos vencidos".to_string(),
            sql: format!(
                "SELECT a.id, a.amount, a.due_date,\n       \
                 tc_borrower.name AS borrower_name,\n       \
                 tc_lender.name AS lender_name\n\
                 FROM agreements a\n\
                 JOIN tenant_contacts tc_borrower ON tc_borrower.id = a.tenant_contact_id\n\
                 JOIN tenant_contacts tc_lender ON tc_lender.id = a.lender_tenant_contact_id\n\
                 WHERE a.tenant_id = '{tenant_id}'\n  \
                 AND a.type = 'loan'\n  \
                 AND a.status = 'active'\n  \
                 AND a.due_date < CURRENT_DATE\n  \
                 AND (a.lender_tenant_contact_id = '{caller_contact_id}' OR a.tenant_contact_id = '{caller_contact_id}')\n\
                 ORDER BY a.due_date ASC"
            ),
            explanation: "Overdue loans where I participate as lender or borrower".to_string(),
        },
        SqlExample {
            question: "contactos con más de 2 préstamos activos".to_string(),
            sql: format!(
                "SELECT tc.name, COUNT(a.id) AS loan_count, SUM(a.amount) AS total_amount\n\
                 FROM tenant_contacts tc\n\
                 JOIN agreements a ON (a.tenant_contact_id = tc.id OR a.lender_tenant_contact_id = tc.id)\n\
                 WHERE a.tenant_id = '{tenant_id}'\n  \
                 AND a.type = 'loan'\n  \
                 AND a.status = 'active'\n  \
                 AND (a.lender_tenant_contact_id = '{caller_contact_id}' OR a.tenant_contact_id = '{caller_contact_id}')\n  \
                 AND tc.id != '{caller_contact_id}'\n\
                 GROUP BY tc.id, tc.name\n\
                 HAVING COUNT(a.id) > 2\n\
                 ORDER BY loan_count DESC"
            ),
            explanation: "Contacts holding several active loans with me".to_string(),
        },
    ]
}

impl SchemaContext {
    /// Full table rendering for the generator prompt.
    pub fn render_tables(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("Table: {}\n{}\n\nColumns:\n", table.name, table.description));
            for c in &table.columns {
                let nullable = if c.nullable { " (nullable)" } else { "" };
                out.push_str(&format!("  - {}: {}{} - {}\n", c.name, c.ty, nullable, c.description));
            }
            out.push_str("Foreign keys:\n");
            for fk in &table.foreign_keys {
                out.push_str(&format!("  - {} → {} ({})\n", fk.column, fk.references, fk.description));
            }
            out.push('\n');
        }
        out
    }

    /// Compact table rendering for the reviewer prompt.
    pub fn render_tables_compact(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.ty))
                .collect();
            out.push_str(&format!(
                "Table: {}\nDescription: {}\nColumns: {}\n\n",
                table.name,
                table.description,
                columns.join(", ")
            ));
        }
        out
    }

    /// Numbered scope rules, shared by both prompts.
    pub fn render_rules(&self) -> String {
        self.scope_rules
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{}. {}", i + 1, rule))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Contact directory listing, capped to keep the prompt bounded.
    pub fn render_contacts(&self, cap: usize) -> String {
        let mut out: Vec<String> = self
            .contacts
            .iter()
            .take(cap)
            .map(|c| format!("  - {}: {}", c.name, c.id))
            .collect();
        if self.contacts.len() > cap {
            out.push(format!("  ... and {} more", self.contacts.len() - cap));
        }
        out.join("\n")
    }

    /// Worked examples rendering for the generator prompt.
    pub fn render_examples(&self) -> String {
        self.examples
            .iter()
            .enumerate()
            .map(|(i, ex)| {
                format!(
                    "Example {}:\nQuestion: \"{}\"\nSQL:\n{}\nExplanation: {}\n",
                    i + 1,
                    ex.question,
                    ex.sql,
                    ex.explanation
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Names of the allow-listed tables.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_allow_list_is_closed() {
        let tables = allowed_tables();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ALLOWED_TABLES);
    }

    #[test]
    fn test_scope_rules_mention_live_identifiers() {
        let (tenant, caller) = ids();
        let rules = scope_rules(tenant, caller);
        assert!(rules[0].contains(&tenant.to_string()));
        assert!(rules
            .iter()
            .any(|r| r.contains(&caller.to_string()) && r.contains("lender_tenant_contact_id")));
    }

    #[test]
    fn test_examples_carry_tenant_filter() {
        let (tenant, caller) = ids();
        for example in worked_examples(tenant, caller) {
            assert!(
                example.sql.contains(&format!("tenant_id = '{tenant}'")),
                "example missing tenant filter: {}",
                example.question
            );
        }
    }

    #[test]
    fn test_contact_rendering_is_capped() {
        let (tenant, caller) = ids();
        let contacts = (0..15)
            .map(|i| Contact {
                id: Uuid::new_v4(),
                name: format!("Contact {i}"),
            })
            .collect();
        let context = SchemaContext {
            tables: allowed_tables(),
            scope_rules: scope_rules(tenant, caller),
            tenant_id: tenant,
            caller_contact_id: caller,
            contacts,
            examples: vec![],
            current_date: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
        };
        let rendered = context.render_contacts(10);
        assert!(rendered.contains("Contact 9"));
        assert!(!rendered.contains("Contact 10:"));
        assert!(rendered.contains("... and 5 more"));
    }
}
