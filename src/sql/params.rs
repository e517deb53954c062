//! Bind values for document queries.

use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A value bound to a `$n` placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    /// Bound as jsonb.
    Json(Value),
}

impl SqlParam {
    /// Scalar text form of a JSON value (`"a"` -> `a`, `12` -> `12`).
    pub fn text(v: &Value) -> Self {
        match v {
            Value::String(s) => SqlParam::Text(s.clone()),
            other => SqlParam::Text(other.to_string()),
        }
    }
}

/// Bind params in placeholder order.
pub fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = match p {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::Int(n) => query.bind(*n),
            SqlParam::Json(v) => query.bind(v.clone()),
        };
    }
    query
}
