// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal filter-expression grammar: `field OP value (AND field OP value)*`.
//!
//! Values are coerced in the following order: a double-quoted literal is
//! always a string; otherwise `true`/`false` become booleans, a value that
//! parses as `f64` becomes a number, and anything else is a string.

use max_error::MaxError;
use serde::{Deserialize, Serialize};

/// A comparison operator recognised by the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl FilterOp {
    const TOKENS: &'static [(&'static str, FilterOp)] = &[
        (">=", FilterOp::Gte),
        ("<=", FilterOp::Lte),
        ("!=", FilterOp::Ne),
        ("=", FilterOp::Eq),
        (">", FilterOp::Gt),
        ("<", FilterOp::Lt),
    ];
}

/// One parsed filter clause: `field OP value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// The field this clause constrains.
    pub field: String,
    /// The comparison operator.
    pub op: FilterOp,
    /// The coerced value (string, number, or boolean).
    pub value: serde_json::Value,
}

impl Filter {
    /// Evaluate this clause against a field value drawn from a stored
    /// entity. Non-comparable type pairs (e.g. comparing a string with
    /// `>`) are treated as non-matching rather than an error.
    #[must_use]
    pub fn matches(&self, actual: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (actual, &self.value) {
            (Value::Number(a), Value::Number(b)) => {
                let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                match self.op {
                    FilterOp::Eq => a == b,
                    FilterOp::Ne => a != b,
                    FilterOp::Gt => a > b,
                    FilterOp::Gte => a >= b,
                    FilterOp::Lt => a < b,
                    FilterOp::Lte => a <= b,
                }
            }
            (Value::Bool(a), Value::Bool(b)) => match self.op {
                FilterOp::Eq => a == b,
                FilterOp::Ne => a != b,
                _ => false,
            },
            (Value::String(a), Value::String(b)) => match self.op {
                FilterOp::Eq => a == b,
                FilterOp::Ne => a != b,
                FilterOp::Gt => a > b,
                FilterOp::Gte => a >= b,
                FilterOp::Lt => a < b,
                FilterOp::Lte => a <= b,
            },
            _ => false,
        }
    }
}

/// Parse a filter expression against the set of fields the caller
/// considers valid, e.g. a schema's declared field names.
///
/// `"name=Acme AND priority>=2 AND active=true"` yields three clauses with
/// coerced types `string`, `number`, `boolean` respectively.
/// `"name=\"42\""` yields the string value `"42"` rather than the number
/// `42`. Referencing a field not present in `known_fields` returns a
/// `BadInput`-faceted [`MaxError`].
pub fn parse_filter(expr: &str, known_fields: &[&str]) -> Result<Vec<Filter>, MaxError> {
    let mut filters = Vec::new();
    for clause in expr.split(" AND ") {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        filters.push(parse_clause(clause, known_fields)?);
    }
    Ok(filters)
}

fn parse_clause(clause: &str, known_fields: &[&str]) -> Result<Filter, MaxError> {
    let (field, op, raw_value) = split_clause(clause)?;
    if !known_fields.contains(&field.as_str()) {
        return Err(MaxError::bad_input(
            "filter.unknown_field",
            format!("unknown field: {field}"),
        ));
    }
    Ok(Filter {
        field,
        op,
        value: coerce_value(raw_value),
    })
}

fn split_clause(clause: &str) -> Result<(String, FilterOp, &str), MaxError> {
    for (token, op) in FilterOp::TOKENS {
        if let Some(idx) = clause.find(token) {
            let field = clause[..idx].trim().to_string();
            let rest = &clause[idx + token.len()..];
            if field.is_empty() {
                return Err(MaxError::bad_input(
                    "filter.invalid_clause",
                    format!("missing field in clause: {clause}"),
                ));
            }
            return Ok((field, *op, rest.trim()));
        }
    }
    Err(MaxError::bad_input(
        "filter.invalid_clause",
        format!("no recognised operator in clause: {clause}"),
    ))
}

fn coerce_value(raw: &str) -> serde_json::Value {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return serde_json::Value::String(raw[1..raw.len() - 1].to_string());
    }
    match raw {
        "true" => return serde_json::Value::Bool(true),
        "false" => return serde_json::Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return serde_json::Value::Number(num);
        }
    }
    serde_json::Value::String(raw.to_string())
}
