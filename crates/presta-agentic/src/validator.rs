//! Deterministic syntax/policy validation of candidate SQL.
//!
//! First line of defense: no model call, no database access, auditable rule
//! by rule. Runs before the semantic review and again on the approved query
//! before execution - no single layer is trusted alone.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::ALLOWED_TABLES;

/// Keywords that must never appear as whole words, in any casing.
const DESTRUCTIVE_KEYWORDS: [&str; 11] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "CALL",
];

/// Timing, file-I/O, cross-database, bulk-copy and catalog primitives.
const DANGEROUS_FUNCTIONS: [&str; 13] = [
    "pg_sleep",
    "pg_read_file",
    "pg_write_file",
    "pg_ls_dir",
    "dblink",
    "dblink_exec",
    "dblink_connect",
    "lo_import",
    "lo_export",
    "lo_unlink",
    "copy",
    "pg_catalog",
    "pg_stat",
];

/// Catalog/introspection/auth namespaces; any dotted reference is blocking.
const SYSTEM_SCHEMAS: [&str; 4] = ["pg_catalog", "information_schema", "pg_temp", "auth"];

static KEYWORD_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    DESTRUCTIVE_KEYWORDS
        .iter()
        .map(|kw| {
            let re = Regex::new(&format!(r"(?i)\b{kw}\b")).expect("static keyword pattern");
            (*kw, re)
        })
        .collect()
});

static FUNCTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    DANGEROUS_FUNCTIONS
        .iter()
        .map(|func| {
            let re = Regex::new(&format!(r"(?i)\b{func}\b")).expect("static function pattern");
            (*func, re)
        })
        .collect()
});

static SCHEMA_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    SYSTEM_SCHEMAS
        .iter()
        .map(|schema| {
            let re = Regex::new(&format!(r"(?i)\b{schema}\.")).expect("static schema pattern");
            (*schema, re)
        })
        .collect()
});

static LEADING_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*select\b").expect("static select pattern"));
static JOIN_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bjoin\b").expect("static pattern"));
static UNION_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bunion\b").expect("static pattern"));
static TABLE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern"));
static AGGREGATE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(sum|count|avg|max|min)\s*\(").expect("static pattern"));
static GROUP_BY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bgroup\s+by\b").expect("static pattern"));
static SELECT_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bselect\b").expect("static pattern"));
static CTE_WITH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwith\b").expect("static pattern"));
static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").expect("static pattern"));
static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("static pattern"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Limits and identity the candidate is checked against.
#[derive(Debug, Clone)]
pub struct QueryPolicy {
    /// Exact tenant value the query must filter by, always blocking.
    pub required_tenant_id: String,
    pub max_joins: usize,
    pub max_length: usize,
}

impl QueryPolicy {
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        Self {
            required_tenant_id: tenant_id.to_string(),
            max_joins: 3,
            max_length: 2000,
        }
    }
}

/// Outcome of the deterministic validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub valid: bool,
    /// Blocking, in rule order.
    pub errors: Vec<String>,
    /// Non-blocking, logged for review.
    pub warnings: Vec<String>,
}

/// Coarse complexity tier, derived from the SQL text, never asked of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
}

impl std::fmt::Display for QueryComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// Validate a candidate statement against the fixed rule set.
///
/// All rules must pass for `valid = true`. The tenant-filter rule is
/// critical: its absence blocks the query no matter what else holds.
pub fn validate_sql(sql: &str, policy: &QueryPolicy) -> SyntaxReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return SyntaxReport {
            valid: false,
            errors: vec!["empty query".to_string()],
            warnings,
        };
    }
    if trimmed.len() > policy.max_length {
        errors.push(format!(
            "query too long ({} chars, max {})",
            trimmed.len(),
            policy.max_length
        ));
    }

    if !LEADING_SELECT.is_match(trimmed) {
        errors.push("query must start with SELECT".to_string());
    }

    for (keyword, pattern) in KEYWORD_PATTERNS.iter() {
        if pattern.is_match(trimmed) {
            errors.push(format!("forbidden keyword detected: {keyword}"));
        }
    }

    for (func, pattern) in FUNCTION_PATTERNS.iter() {
        if pattern.is_match(trimmed) {
            errors.push(format!("dangerous function detected: {func}"));
        }
    }

    check_tenant_filter(trimmed, &policy.required_tenant_id, &mut errors);

    // Statement stacking: a ';' anywhere but the very end is blocking.
    let end_trimmed = trimmed.trim_end();
    if let Some(index) = end_trimmed.find(';') {
        if index < end_trimmed.len() - 1 {
            errors.push("multiple statements detected (;) - only one query is allowed".to_string());
        }
    }

    let join_count = JOIN_WORD.find_iter(trimmed).count();
    if join_count > policy.max_joins {
        errors.push(format!(
            "too many JOINs ({join_count}, max {})",
            policy.max_joins
        ));
    }

    for table in extract_tables(trimmed) {
        if !ALLOWED_TABLES.contains(&table.as_str()) {
            errors.push(format!(
                "table not allowed: {table}. Permitted tables: {}",
                ALLOWED_TABLES.join(", ")
            ));
        }
    }

    if trimmed.contains("--") || trimmed.contains("/*") {
        warnings.push("query contains comments; manual review recommended".to_string());
    }
    if UNION_WORD.is_match(trimmed) {
        warnings.push("query contains UNION; verify it is not a bypass attempt".to_string());
    }

    for (schema, pattern) in SCHEMA_PATTERNS.iter() {
        if pattern.is_match(trimmed) {
            errors.push(format!("access to system schema forbidden: {schema}"));
        }
    }

    let open_parens = trimmed.matches('(').count();
    let close_parens = trimmed.matches(')').count();
    if open_parens != close_parens {
        errors.push("unbalanced parentheses".to_string());
    }
    if open_parens > 10 {
        warnings.push("deeply nested subqueries; may time out".to_string());
    }

    if AGGREGATE_CALL.is_match(trimmed) && !GROUP_BY.is_match(trimmed) && join_count > 0 {
        warnings.push("aggregation without GROUP BY across JOINs; verify expected result".to_string());
    }

    SyntaxReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_tenant_filter(sql: &str, required_tenant_id: &str, errors: &mut Vec<String>) {
    let lowered = sql.to_lowercase();
    if !(lowered.contains("tenant_id") && lowered.contains("where")) {
        errors.push("CRITICAL: missing tenant_id filter in WHERE clause".to_string());
        return;
    }
    let pattern = Regex::new(&format!(
        r#"(?i)tenant_id\s*=\s*['"]{}['"]"#,
        regex::escape(required_tenant_id)
    ))
    .expect("escaped tenant pattern");
    if !pattern.is_match(sql) {
        errors.push(format!(
            "CRITICAL: tenant_id does not match the expected value ({required_tenant_id})"
        ));
    }
}

/// Table names referenced after FROM/JOIN, lowercased and deduplicated.
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for capture in TABLE_REF.captures_iter(sql) {
        let name = capture[1].to_lowercase();
        if !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}

/// Deterministic complexity estimate from JOIN/subquery/aggregate/CTE counts.
pub fn estimate_complexity(sql: &str) -> QueryComplexity {
    let join_count = JOIN_WORD.find_iter(sql).count();
    let subquery_count = SELECT_WORD.find_iter(sql).count().saturating_sub(1);
    let has_aggregation = AGGREGATE_CALL.is_match(sql) || GROUP_BY.is_match(sql);
    let has_cte = CTE_WITH.is_match(sql);

    if has_cte || subquery_count > 2 || join_count > 2 {
        QueryComplexity::Complex
    } else if join_count > 0 || has_aggregation || subquery_count > 0 {
        QueryComplexity::Moderate
    } else {
        QueryComplexity::Simple
    }
}

/// Strip comments, collapse whitespace and truncate - for log lines only,
/// never for execution.
pub fn sanitize_for_logging(sql: &str) -> String {
    let without_line = LINE_COMMENT.replace_all(sql, "");
    let without_block = BLOCK_COMMENT.replace_all(&without_line, "");
    let collapsed = WHITESPACE_RUN.replace_all(without_block.trim(), " ");
    if collapsed.len() > 500 {
        format!("{}... (truncated)", &collapsed[..500])
    } else {
        collapsed.into_owned()
    }
}
