//! Input validation for order and composition requests
//!
//! Structured composer inputs arrive as raw JSON text from form fields. They
//! are parsed leniently: absent or blank input is an empty list and a single
//! value that is not a list is treated as a list of one. Input that is not
//! JSON at all, or whose items have the wrong shape, is a validation error
//! naming the field.

use crate::error::{validation, OrderResult};
use crate::models::{RecordId, MAX_MONEY, MONEY_SCALE};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// Longest accepted free-text value
pub const MAX_TEXT_LENGTH: usize = 4000;

/// One named entry of the conditions or preferences list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntry {
    /// Trimmed; may be empty, in which case the entry is skipped
    pub name: String,
    /// `date` for conditions, `description` for preferences
    pub detail: Option<String>,
}

/// Trimmed value of a mandatory text field
pub fn require_text(field: &str, value: &str) -> OrderResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation(field, "must not be empty"));
    }
    check_length(field, trimmed)?;
    Ok(trimmed.to_string())
}

/// Trimmed value of an optional text field, `None` when blank
pub fn optional_text(field: &str, value: Option<&str>) -> OrderResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(text) => {
            check_length(field, text)?;
            Ok(Some(text.to_string()))
        }
        None => Ok(None),
    }
}

fn check_length(field: &str, value: &str) -> OrderResult<()> {
    if value.chars().count() > MAX_TEXT_LENGTH {
        return Err(validation(
            field,
            format!("exceeds {MAX_TEXT_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Monetary amounts are strictly positive, at most [`MAX_MONEY`] and carry at
/// most two fractional digits
pub fn validate_positive_amount(field: &str, amount: Decimal) -> OrderResult<()> {
    if amount <= Decimal::ZERO {
        return Err(validation(field, format!("must be greater than zero, got {amount}")));
    }
    if amount > MAX_MONEY {
        return Err(validation(field, format!("must not exceed {MAX_MONEY}, got {amount}")));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(validation(
            field,
            format!("must have at most {MONEY_SCALE} decimal places, got {amount}"),
        ));
    }
    Ok(())
}

/// Parse a JSON list field, wrapping a lone value into a one-element list
pub fn parse_json_list(field: &str, raw: Option<&str>, max_items: usize) -> OrderResult<Vec<Value>> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(Vec::new());
    };
    let value: Value = serde_json::from_str(text)
        .map_err(|e| validation(field, format!("malformed JSON: {e}")))?;
    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };
    if items.len() > max_items {
        return Err(validation(
            field,
            format!("at most {max_items} entries allowed, got {}", items.len()),
        ));
    }
    Ok(items)
}

/// Allergy catalog ids given as integers or numeric strings
pub fn parse_allergy_ids(raw: Option<&str>, max_items: usize) -> OrderResult<Vec<RecordId>> {
    const FIELD: &str = "allergy_ids";
    parse_json_list(FIELD, raw, max_items)?
        .into_iter()
        .map(|item| match &item {
            Value::Number(n) => n
                .as_u64()
                .filter(|v| *v > 0)
                .map(RecordId::new)
                .ok_or_else(|| validation(FIELD, format!("invalid allergy id {item}"))),
            Value::String(s) => s
                .parse::<RecordId>()
                .map_err(|reason| validation(FIELD, reason)),
            _ => Err(validation(FIELD, format!("invalid allergy id {item}"))),
        })
        .collect()
}

/// Entries given as bare names or objects with `name` and `detail_key`
pub fn parse_named_entries(
    field: &str,
    raw: Option<&str>,
    detail_key: &str,
    max_items: usize,
) -> OrderResult<Vec<NamedEntry>> {
    parse_json_list(field, raw, max_items)?
        .into_iter()
        .map(|item| match item {
            Value::String(name) => Ok(NamedEntry {
                name: name.trim().to_string(),
                detail: None,
            }),
            Value::Object(map) => {
                let name = match map.get("name") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(name)) => name.trim().to_string(),
                    Some(other) => {
                        return Err(validation(field, format!("name must be text, got {other}")))
                    }
                };
                let detail = match map.get(detail_key) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(text)) => {
                        Some(text.trim().to_string()).filter(|t| !t.is_empty())
                    }
                    Some(other) => {
                        return Err(validation(
                            field,
                            format!("{detail_key} must be text, got {other}"),
                        ))
                    }
                };
                if let Some(text) = &detail {
                    check_length(field, text)?;
                }
                check_length(field, &name)?;
                Ok(NamedEntry { name, detail })
            }
            other => Err(validation(
                field,
                format!("expected a name or an object, got {other}"),
            )),
        })
        .collect()
}

/// Resolve a condition date, falling back when it is absent or unparseable
pub fn resolve_date(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return fallback;
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return parsed.and_utc();
    }
    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return midnight.and_utc();
    }
    tracing::debug!(value = %text, "Unparseable condition date, using creation time");
    fallback
}
