//! Database bootstrap: create the database when missing, then the document tables in `CRM_SCHEMA`.

use crate::error::StoreError;
use crate::sql::{documents_table, quoted, series_table};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

/// Create schema, `documents` and `naming_series` if they do not exist. Idempotent.
pub async fn ensure_document_tables(pool: &PgPool, schema: &str) -> Result<(), StoreError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)))
        .execute(pool)
        .await?;

    let docs = documents_table(schema);
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            doctype TEXT NOT NULL,
            name TEXT NOT NULL,
            docstatus INTEGER NOT NULL DEFAULT 0,
            owner TEXT NOT NULL,
            creation TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            modified TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            data JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            PRIMARY KEY (doctype, name)
        )
        "#,
        docs
    );
    sqlx::query(&ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS documents_doctype_modified_idx ON {} (doctype, modified DESC)",
        docs
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS documents_data_idx ON {} USING GIN (data jsonb_path_ops)",
        docs
    ))
    .execute(pool)
    .await?;

    let series_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            prefix TEXT PRIMARY KEY,
            current BIGINT NOT NULL DEFAULT 0
        )
        "#,
        series_table(schema)
    );
    sqlx::query(&series_ddl).execute(pool).await?;
    tracing::debug!(schema = %schema, "document tables ready");
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "created database");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = url
        .get(scheme_end..)
        .and_then(|rest| rest.find('/'))
        .map(|i| scheme_end + i + 1)
        .ok_or_else(|| StoreError::Db(sqlx::Error::Configuration("DATABASE_URL: no database path".into())))?;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let mut split = path_and_query.splitn(2, '?');
    let db_name = split.next().unwrap_or("").trim();
    let query = split.next().map(|q| format!("?{}", q)).unwrap_or_default();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres{}", base, query);
    Ok((admin_url, db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_database_name_and_keeps_query() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/crm?sslmode=disable").unwrap();
        assert_eq!(db, "crm");
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres?sslmode=disable");
    }

    #[test]
    fn url_without_path_is_rejected() {
        assert!(parse_db_name_from_url("postgres://localhost").is_err());
    }
}
