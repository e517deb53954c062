//! Input checks shared by handlers, and the typed-payload to field-map bridge.

use crate::error::AppError;
use serde::Serialize;
use serde_json::{Map, Value};

pub struct RequestValidator;

impl RequestValidator {
    /// Fails on the first field that is missing or blank, in the order given.
    pub fn require(fields: &[(&str, Option<&str>)]) -> Result<(), AppError> {
        for (name, value) in fields {
            if value.map(str::trim).unwrap_or("").is_empty() {
                return Err(AppError::required(name));
            }
        }
        Ok(())
    }
}

/// Non-blank value or `"<field> is required"`.
pub fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::required(field))
}

/// Serializes a typed payload into document fields. Absent (`None`) values are dropped,
/// so the result holds exactly the fields the caller sent.
pub fn field_map<T: Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => {
            fields.retain(|_, v| !v.is_null());
            Ok(fields)
        }
        _ => Err(AppError::Internal("payload did not serialize to an object".into())),
    }
}

/// Child table rows as field maps.
pub fn table<T: Serialize>(rows: &[T]) -> Result<Value, AppError> {
    let rows = rows.iter().map(|r| field_map(r).map(Value::Object)).collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}
