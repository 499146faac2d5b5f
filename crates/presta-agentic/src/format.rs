//! Result formatting for the conversation layer.
//!
//! Rendering depends on the caller-declared expected shape; currency-like
//! numeric columns use Chilean thousands separators and empty result sets
//! produce an explicit message, never an empty payload.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ports::Row;

/// Shape the caller expects the answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    SingleValue,
    List,
    Aggregation,
    Comparison,
}

impl FromStr for ResponseShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_value" => Ok(Self::SingleValue),
            "list" => Ok(Self::List),
            "aggregation" => Ok(Self::Aggregation),
            "comparison" => Ok(Self::Comparison),
            other => Err(format!("unknown response shape: {other}")),
        }
    }
}

/// Column names treated as money when their value is numeric.
const CURRENCY_HINTS: [&str; 9] = [
    "amount", "total", "sum", "monto", "balance", "saldo", "owed", "debt", "deuda",
];

const MAX_LIST_LINES: usize = 20;

const EMPTY_MESSAGE: &str = "No encontré resultados para tu consulta.";

/// Render a result set for the end user.
pub fn format_rows(shape: ResponseShape, rows: &[Row]) -> String {
    if rows.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    match shape {
        ResponseShape::SingleValue => format_single_value(rows),
        ResponseShape::List => format_list(rows, ", "),
        ResponseShape::Aggregation => format_aggregation(rows),
        ResponseShape::Comparison => format_list(rows, " | "),
    }
}

fn format_single_value(rows: &[Row]) -> String {
    let row = &rows[0];
    match row.iter().next() {
        Some((column, value)) => format!("{}: {}", humanize(column), render_value(column, value)),
        None => EMPTY_MESSAGE.to_string(),
    }
}

fn format_list(rows: &[Row], separator: &str) -> String {
    let mut lines: Vec<String> = rows
        .iter()
        .take(MAX_LIST_LINES)
        .map(|row| {
            let fields: Vec<String> = row
                .iter()
                .map(|(column, value)| {
                    format!("{}: {}", humanize(column), render_value(column, value))
                })
                .collect();
            format!("• {}", fields.join(separator))
        })
        .collect();
    if rows.len() > MAX_LIST_LINES {
        lines.push(format!("... y {} más", rows.len() - MAX_LIST_LINES));
    }
    lines.join("\n")
}

/// Grouped rows: first column as label, remaining columns as values.
fn format_aggregation(rows: &[Row]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for row in rows.iter().take(MAX_LIST_LINES) {
        let mut fields = row.iter();
        let line = match fields.next() {
            Some((_, label)) => {
                let rest: Vec<String> = fields
                    .map(|(column, value)| render_value(column, value))
                    .collect();
                format!("• {}: {}", render_bare(label), rest.join(", "))
            }
            None => continue,
        };
        lines.push(line);
    }
    if rows.len() > MAX_LIST_LINES {
        lines.push(format!("... y {} más", rows.len() - MAX_LIST_LINES));
    }
    lines.join("\n")
}

fn humanize(column: &str) -> String {
    column.replace('_', " ")
}

fn is_currency_column(column: &str) -> bool {
    let lowered = column.to_lowercase();
    CURRENCY_HINTS.iter().any(|hint| lowered.contains(hint))
}

fn render_value(column: &str, value: &Value) -> String {
    match value {
        Value::Number(n) if is_currency_column(column) => {
            format_clp(n.as_f64().unwrap_or_default())
        }
        other => render_bare(other),
    }
}

fn render_bare(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Chilean peso rendering: no decimals, '.' as thousands separator.
pub fn format_clp(amount: f64) -> String {
    let negative = amount < 0.0;
    let rounded = amount.abs().round() as i64;
    let digits = rounded.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
