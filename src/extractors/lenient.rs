//! Field deserializers that accept the loose shapes form posts and query strings produce:
//! numbers as strings, flags as `1`/`true`, child tables as JSON-encoded strings.
//!
//! Use with `#[serde(default, deserialize_with = "...")]`.

use serde::de::{DeserializeOwned, Error};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn raw<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.filter(|v| !v.is_null()))
}

/// Integer from a number or a numeric string; blank is None.
pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match raw(d)? {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected an integer")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid integer: {}", s))),
        Some(other) => Err(D::Error::custom(format!("expected an integer, got {}", other))),
    }
}

/// Float from a number or a numeric string; blank is None.
pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match raw(d)? {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid number: {}", s))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}

fn flag_of(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "1" | "true" | "yes" | "on" => Some(true),
            _ => Some(false),
        },
        _ => None,
    }
}

/// Boolean from `true`/`false`, `1`/`0`, or their string forms.
pub fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(raw(d)?.as_ref().and_then(flag_of))
}

/// Check field stored as `0`/`1`.
pub fn opt_check<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(raw(d)?.as_ref().and_then(flag_of).map(i64::from))
}

/// Text from a string or a number (phone numbers often arrive as numbers). Empty strings are kept.
pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match raw(d)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected text, got {}", other))),
    }
}

/// Child table from a JSON array or a JSON-encoded string.
pub fn json_list<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = match raw(d)? {
        None => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Some(Vec::new())),
        Some(Value::String(s)) => serde_json::from_str(&s).map_err(D::Error::custom)?,
        Some(v) => v,
    };
    serde_json::from_value(value).map(Some).map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "opt_i64")]
        page: Option<i64>,
        #[serde(default, deserialize_with = "opt_f64")]
        rate: Option<f64>,
        #[serde(default, deserialize_with = "opt_flag")]
        submit: Option<bool>,
        #[serde(default, deserialize_with = "opt_check")]
        disabled: Option<i64>,
        #[serde(default, deserialize_with = "opt_text")]
        mobile_no: Option<String>,
        #[serde(default, deserialize_with = "json_list")]
        items: Option<Vec<Value>>,
    }

    #[test]
    fn accepts_string_forms() {
        let row: Row = serde_json::from_value(json!({
            "page": "3",
            "rate": "12.5",
            "submit": "true",
            "disabled": "1",
            "mobile_no": 9876543210u64,
            "items": "[{\"item_code\":\"PEN\"}]"
        }))
        .unwrap();
        assert_eq!(row.page, Some(3));
        assert_eq!(row.rate, Some(12.5));
        assert_eq!(row.submit, Some(true));
        assert_eq!(row.disabled, Some(1));
        assert_eq!(row.mobile_no.as_deref(), Some("9876543210"));
        assert_eq!(row.items.unwrap()[0]["item_code"], "PEN");
    }

    #[test]
    fn blanks_and_nulls_are_absent() {
        let row: Row = serde_json::from_value(json!({"page": "", "rate": null, "submit": ""})).unwrap();
        assert_eq!(row.page, None);
        assert_eq!(row.rate, None);
        assert_eq!(row.submit, None);
        assert!(row.items.is_none());
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(serde_json::from_value::<Row>(json!({"page": "two"})).is_err());
    }
}
