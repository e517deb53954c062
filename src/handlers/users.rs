//! Enabled system users with their role names.

use crate::error::{AppError, LogFailure};
use crate::response::counted_list;
use crate::state::AppState;
use crate::store::{Document, Filter, ListQuery, SortOrder};
use axum::{extract::State, response::IntoResponse};
use serde_json::Value;

const USER_FIELDS: &[&str] = &[
    "name",
    "email",
    "first_name",
    "last_name",
    "full_name",
    "username",
    "mobile_no",
    "phone",
    "location",
    "user_type",
    "enabled",
    "time_zone",
    "language",
    "last_login",
    "creation",
    "modified",
];

/// Role names from the `roles` child rows, which may be plain strings or `{role}` objects.
fn role_names(user: &Document) -> Vec<String> {
    user.table("roles")
        .iter()
        .filter_map(|r| match r {
            Value::String(s) => Some(s.clone()),
            Value::Object(row) => row.get("role").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

pub async fn get_full_user_list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut fields = USER_FIELDS.to_vec();
    fields.push("roles");
    let query = ListQuery::new("User")
        .fields(&fields)
        .filters(vec![Filter::eq("enabled", 1)])
        .order_by("full_name", SortOrder::Asc);
    let users = state.store.list(&query).await.log_failure("user list")?;
    let rows = users
        .iter()
        .map(|u| {
            let mut row = u.project(USER_FIELDS);
            if let Value::Object(m) = &mut row {
                m.insert("roles".into(), Value::from(role_names(u)));
            }
            row
        })
        .collect();
    Ok(counted_list(rows, "User List Fetched Successfully")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryDocumentStore, NewDocument};
    use serde_json::json;

    #[tokio::test]
    async fn roles_accept_strings_and_rows() {
        let store = MemoryDocumentStore::new();
        let Value::Object(fields) = json!({
            "email": "ana@example.com",
            "enabled": 1,
            "roles": ["Sales User", {"role": "Sales Manager"}, 3],
        }) else {
            unreachable!()
        };
        let user = store.insert(NewDocument::new("User", "Administrator", fields)).await.unwrap();
        assert_eq!(role_names(&user), vec!["Sales User", "Sales Manager"]);
    }
}
