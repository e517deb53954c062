//! Standard response envelope helpers.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Build the success envelope. With `flatten`, an object payload is merged into the root;
/// anything else (including non-object payloads with `flatten`) goes under `data`.
pub fn api_response(data: Value, message: &str, status: StatusCode, flatten: bool) -> (StatusCode, Json<Value>) {
    let mut body = Map::new();
    body.insert("status".into(), Value::String("success".into()));
    body.insert("status_code".into(), Value::Number(status.as_u16().into()));
    body.insert("message".into(), Value::String(message.to_string()));
    match data {
        Value::Object(fields) if flatten => {
            for (k, v) in fields {
                body.insert(k, v);
            }
        }
        other => {
            body.insert("data".into(), other);
        }
    }
    (status, Json(Value::Object(body)))
}

pub fn success(data: Value, message: &str) -> (StatusCode, Json<Value>) {
    api_response(data, message, StatusCode::OK, false)
}

pub fn success_flat(data: Value, message: &str) -> (StatusCode, Json<Value>) {
    api_response(data, message, StatusCode::OK, true)
}

pub fn created_flat(data: Value, message: &str) -> (StatusCode, Json<Value>) {
    api_response(data, message, StatusCode::CREATED, true)
}

pub fn api_error(message: &str) -> Value {
    json!({
        "status": "error",
        "message": message
    })
}

/// Pagination block used by master lists.
#[derive(Debug, Serialize, PartialEq)]
pub struct PaginationMeta {
    pub page: i64,
    pub page_size: i64,
    pub total_records: u64,
    pub total_pages: u64,
}

/// `{status, message, pagination, data}` envelope for master lists.
pub fn master_list<T: Serialize>(
    data: Vec<T>,
    pagination: Option<PaginationMeta>,
    message: &str,
) -> Result<(StatusCode, Json<Value>), serde_json::Error> {
    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": message,
            "pagination": serde_json::to_value(pagination)?,
            "data": serde_json::to_value(data)?,
        })),
    ))
}

/// `{status, message, count, data}` envelope for small unpaged lists.
pub fn counted_list<T: Serialize>(data: Vec<T>, message: &str) -> Result<(StatusCode, Json<Value>), serde_json::Error> {
    let count = data.len();
    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": message,
            "count": count,
            "data": serde_json::to_value(data)?,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_merges_object_into_root() {
        let (status, Json(body)) = api_response(json!({"lead_id": "CRM-LEAD-2025-00001"}), "ok", StatusCode::CREATED, true);
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");
        assert_eq!(body["status_code"], 201);
        assert_eq!(body["message"], "ok");
        assert_eq!(body["lead_id"], "CRM-LEAD-2025-00001");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn nested_payload_stays_under_data() {
        let (_, Json(body)) = success(json!({"lead_id": "L"}), "fetched");
        assert_eq!(body["data"]["lead_id"], "L");
        assert!(body.get("lead_id").is_none());
    }

    #[test]
    fn flatten_with_non_object_falls_back_to_data() {
        let (_, Json(body)) = success_flat(json!([1, 2]), "list");
        assert_eq!(body["data"], json!([1, 2]));
        assert_eq!(body["message"], "list");
    }

    #[test]
    fn full_master_list_has_null_pagination() {
        let (_, Json(body)) = master_list(vec![json!({"name": "All Customer Groups"})], None, "groups").unwrap();
        assert!(body["pagination"].is_null());
        assert_eq!(body["data"][0]["name"], "All Customer Groups");
    }
}
