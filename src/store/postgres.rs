//! Postgres store: one `documents` table with a JSONB field map, series counters in `naming_series`.

use super::{
    apply_transition, check_deletable, check_savable, is_standard, strip_standard, validate_field,
    AggregateQuery, Bucket, DocStatus, Document, DocumentStore, Filter, ListQuery, NewDocument,
};
use crate::config::{doctype_meta, PlannedName, Settings};
use crate::error::StoreError;
use crate::migration::{ensure_database_exists, ensure_document_tables};
use crate::sql::{
    aggregate_documents, bind_params, count_documents, documents_table, select_documents, series_table,
    DOCUMENT_COLUMNS,
};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use std::str::FromStr;

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    schema: String,
}

/// Postgres keeps microseconds.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn row_to_document(row: &PgRow) -> Result<Document, StoreError> {
    let docstatus: i32 = row.try_get("docstatus")?;
    let data: Value = row.try_get("data")?;
    Ok(Document {
        doctype: row.try_get("doctype")?,
        name: row.try_get("name")?,
        docstatus: DocStatus::try_from(i64::from(docstatus)).map_err(StoreError::InvalidState)?,
        owner: row.try_get("owner")?,
        creation: row.try_get("creation")?,
        modified: row.try_get("modified")?,
        fields: match data {
            Value::Object(m) => m,
            _ => Map::new(),
        },
    })
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgDocumentStore {
            pool,
            schema: schema.into(),
        }
    }

    /// Create the database and tables if needed, then open a pool with the session in UTC.
    pub async fn connect(settings: &Settings) -> Result<Self, StoreError> {
        ensure_database_exists(&settings.database_url).await?;
        let options = PgConnectOptions::from_str(&settings.database_url)?.options([("timezone", "UTC")]);
        let pool = PgPoolOptions::new().max_connections(5).connect_with(options).await?;
        ensure_document_tables(&pool, &settings.schema).await?;
        Ok(Self::new(pool, settings.schema.clone()))
    }

    fn table(&self) -> String {
        documents_table(&self.schema)
    }

    async fn lock_one(&self, conn: &mut PgConnection, doctype: &str, name: &str) -> Result<Document, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE doctype = $1 AND name = $2 FOR UPDATE",
            DOCUMENT_COLUMNS,
            self.table()
        );
        let row = sqlx::query(&sql)
            .bind(doctype)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| StoreError::not_found(doctype, name))?;
        row_to_document(&row)
    }

    async fn next_in_series(&self, conn: &mut PgConnection, key: &str) -> Result<u64, StoreError> {
        let sql = format!(
            "INSERT INTO {} AS s (prefix, current) VALUES ($1, 1) \
             ON CONFLICT (prefix) DO UPDATE SET current = s.current + 1 RETURNING current",
            series_table(&self.schema)
        );
        let current: i64 = sqlx::query_scalar(&sql).bind(key).fetch_one(&mut *conn).await?;
        Ok(current.max(0) as u64)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, doctype: &str, name: &str) -> Result<Document, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE doctype = $1 AND name = $2",
            DOCUMENT_COLUMNS,
            self.table()
        );
        let row = sqlx::query(&sql)
            .bind(doctype)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(doctype, name))?;
        row_to_document(&row)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Document>, StoreError> {
        let q = select_documents(&self.schema, query)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "list query");
        let rows = bind_params(sqlx::query(&q.sql), &q.params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let mut doc = row_to_document(row)?;
                doc.retain_fields(&query.fields);
                Ok(doc)
            })
            .collect()
    }

    async fn count(&self, doctype: &str, filters: &[Filter], or_filters: &[Filter]) -> Result<u64, StoreError> {
        let q = count_documents(&self.schema, doctype, filters, or_filters)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "count query");
        let row = bind_params(sqlx::query(&q.sql), &q.params)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn insert(&self, new: NewDocument) -> Result<Document, StoreError> {
        let NewDocument {
            doctype,
            name,
            owner,
            mut fields,
        } = new;
        let created = now();
        let planned = match name {
            Some(n) => PlannedName::Fixed(n),
            None => doctype_meta(&doctype).plan_name(&doctype, &fields, created.date_naive())?,
        };
        strip_standard(&mut fields);

        let mut tx = self.pool.begin().await?;
        let name = match planned {
            PlannedName::Fixed(n) => n,
            PlannedName::Series { key, digits } => {
                let n = self.next_in_series(&mut tx, &key).await?;
                PlannedName::with_counter(&key, digits, n)
            }
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (doctype, name) DO NOTHING",
            self.table(),
            DOCUMENT_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(&doctype)
            .bind(&name)
            .bind(0i32)
            .bind(&owner)
            .bind(created)
            .bind(created)
            .bind(Value::Object(fields.clone()))
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate { doctype, name });
        }
        tx.commit().await?;
        tracing::debug!(doctype = %doctype, name = %name, "document inserted");
        Ok(Document {
            doctype,
            name,
            docstatus: DocStatus::Draft,
            owner,
            creation: created,
            modified: created,
            fields,
        })
    }

    async fn save(&self, doc: &Document) -> Result<Document, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = self.lock_one(&mut tx, &doc.doctype, &doc.name).await?;
        check_savable(&stored)?;
        let mut fields = doc.fields.clone();
        strip_standard(&mut fields);
        stored.fields = fields;
        stored.modified = now();
        let sql = format!(
            "UPDATE {} SET data = $3, modified = $4 WHERE doctype = $1 AND name = $2",
            self.table()
        );
        sqlx::query(&sql)
            .bind(&stored.doctype)
            .bind(&stored.name)
            .bind(Value::Object(stored.fields.clone()))
            .bind(stored.modified)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn set_value(
        &self,
        doctype: &str,
        name: &str,
        field: &str,
        value: Value,
        update_modified: bool,
    ) -> Result<(), StoreError> {
        validate_field(field)?;
        if is_standard(field) {
            return Err(StoreError::InvalidField(field.to_string()));
        }
        let modified = if update_modified { ", modified = NOW()" } else { "" };
        let sql = format!(
            "UPDATE {} SET data = jsonb_set(data, $3, $4, true){} WHERE doctype = $1 AND name = $2",
            self.table(),
            modified
        );
        let result = sqlx::query(&sql)
            .bind(doctype)
            .bind(name)
            .bind(vec![field.to_string()])
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(doctype, name));
        }
        Ok(())
    }

    async fn set_docstatus(&self, doctype: &str, name: &str, to: DocStatus) -> Result<Document, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut doc = self.lock_one(&mut tx, doctype, name).await?;
        apply_transition(&mut doc, to)?;
        doc.modified = now();
        let sql = format!(
            "UPDATE {} SET docstatus = $3, data = $4, modified = $5 WHERE doctype = $1 AND name = $2",
            self.table()
        );
        sqlx::query(&sql)
            .bind(doctype)
            .bind(name)
            .bind(doc.docstatus.as_i64() as i32)
            .bind(Value::Object(doc.fields.clone()))
            .bind(doc.modified)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::debug!(doctype = %doctype, name = %name, docstatus = doc.docstatus.as_i64(), "docstatus changed");
        Ok(doc)
    }

    async fn delete(&self, doctype: &str, name: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let doc = self.lock_one(&mut tx, doctype, name).await?;
        check_deletable(&doc)?;
        sqlx::query(&format!("DELETE FROM {} WHERE doctype = $1 AND name = $2", self.table()))
            .bind(doctype)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<Bucket>, StoreError> {
        let q = aggregate_documents(&self.schema, query)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "aggregate query");
        let rows = bind_params(sqlx::query(&q.sql), &q.params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Bucket {
                    label: row.try_get("label")?,
                    value: row.try_get("value")?,
                })
            })
            .collect()
    }
}
