//! Builds parameterized SELECTs over the documents table from list and aggregate queries.
//! Field names are validated identifiers; every value is a parameter.

use super::SqlParam;
use crate::error::StoreError;
use crate::store::{validate_field, AggregateQuery, Condition, Filter, GroupBy, ListQuery, Measure};
use serde_json::Value;

/// Columns selected for a full document row.
pub const DOCUMENT_COLUMNS: &str = "doctype, name, docstatus, owner, creation, modified, data";

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

pub fn documents_table(schema: &str) -> String {
    qualified_table(schema, "documents")
}

pub fn series_table(schema: &str) -> String {
    qualified_table(schema, "naming_series")
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: SqlParam) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }
}

/// Where a field lives: a typed column or a key of the `data` jsonb.
enum Column {
    Text(&'static str),
    Int(&'static str),
    Timestamp(&'static str),
    Data(String),
}

fn column(field: &str) -> Result<Column, StoreError> {
    validate_field(field)?;
    Ok(match field {
        "name" => Column::Text("name"),
        "owner" => Column::Text("owner"),
        "docstatus" => Column::Int("docstatus"),
        "creation" => Column::Timestamp("creation"),
        "modified" => Column::Timestamp("modified"),
        other => Column::Data(other.to_string()),
    })
}

impl Column {
    /// jsonb for data keys, the column itself otherwise.
    fn json_expr(&self) -> String {
        match self {
            Column::Data(f) => format!("data->'{}'", f),
            Column::Text(c) | Column::Int(c) | Column::Timestamp(c) => quoted(c),
        }
    }

    fn text_expr(&self) -> String {
        match self {
            Column::Data(f) => format!("data->>'{}'", f),
            Column::Text(c) => quoted(c),
            Column::Int(c) | Column::Timestamp(c) => format!("{}::text", quoted(c)),
        }
    }

    fn order_expr(&self) -> String {
        match self {
            Column::Data(f) => format!("COALESCE(data->'{}', 'null'::jsonb)", f),
            other => other.json_expr(),
        }
    }

    /// Placeholder for a scalar compared against this column.
    fn scalar(&self, q: &mut QueryBuf, v: &Value) -> String {
        match self {
            Column::Data(_) => q.push_param(SqlParam::Json(v.clone())),
            Column::Int(_) => match v.as_i64() {
                Some(n) => q.push_param(SqlParam::Int(n)),
                None => format!("{}::int", q.push_param(SqlParam::text(v))),
            },
            Column::Timestamp(_) => format!("{}::timestamptz", q.push_param(SqlParam::text(v))),
            Column::Text(_) => q.push_param(SqlParam::text(v)),
        }
    }

    /// `lhs op $n` for range comparisons. Numbers compare numerically on data keys.
    fn range(&self, q: &mut QueryBuf, op: &str, v: &Value) -> String {
        match (self, v) {
            (Column::Data(_), Value::Number(n)) => {
                let p = q.push_param(SqlParam::Text(n.to_string()));
                format!("({})::numeric {} {}::numeric", self.text_expr(), op, p)
            }
            (Column::Data(_), other) => {
                let p = q.push_param(SqlParam::text(other));
                format!("{} {} {}", self.text_expr(), op, p)
            }
            (col, other) => {
                let p = col.scalar(q, other);
                format!("{} {} {}", col.json_expr(), op, p)
            }
        }
    }
}

fn condition_sql(q: &mut QueryBuf, filter: &Filter) -> Result<String, StoreError> {
    let col = column(&filter.field)?;
    Ok(match &filter.cond {
        Condition::Eq(v) => {
            let p = col.scalar(q, v);
            format!("{} = {}", col.json_expr(), p)
        }
        Condition::Like(pattern) => {
            let p = q.push_param(SqlParam::Text(pattern.clone()));
            format!("{} ILIKE {}", col.text_expr(), p)
        }
        Condition::In(list) if list.is_empty() => "FALSE".into(),
        Condition::In(list) => {
            let ps: Vec<String> = list.iter().map(|v| col.scalar(q, v)).collect();
            format!("{} IN ({})", col.json_expr(), ps.join(", "))
        }
        Condition::NotIn(list) if list.is_empty() => "TRUE".into(),
        Condition::NotIn(list) => {
            let ps: Vec<String> = list.iter().map(|v| col.scalar(q, v)).collect();
            let expr = col.json_expr();
            format!("({} IS NULL OR {} NOT IN ({}))", expr, expr, ps.join(", "))
        }
        Condition::Gt(v) => col.range(q, ">", v),
        Condition::Gte(v) => col.range(q, ">=", v),
        Condition::Lt(v) => col.range(q, "<", v),
        Condition::Lte(v) => col.range(q, "<=", v),
        Condition::Between(lo, hi) => {
            let a = col.range(q, ">=", lo);
            let b = col.range(q, "<=", hi);
            format!("({} AND {})", a, b)
        }
        Condition::IsSet(true) => format!("COALESCE({}, '') <> ''", col.text_expr()),
        Condition::IsSet(false) => format!("COALESCE({}, '') = ''", col.text_expr()),
        Condition::Contains(v) => match col {
            Column::Data(_) => {
                let p = q.push_param(SqlParam::Json(v.clone()));
                format!("{} @> {}", col.json_expr(), p)
            }
            _ => return Err(StoreError::InvalidField(filter.field.clone())),
        },
    })
}

fn where_clause(q: &mut QueryBuf, doctype: &str, filters: &[Filter], or_filters: &[Filter]) -> Result<String, StoreError> {
    let p = q.push_param(SqlParam::Text(doctype.to_string()));
    let mut parts = vec![format!("doctype = {}", p)];
    for f in filters {
        parts.push(condition_sql(q, f)?);
    }
    if !or_filters.is_empty() {
        let mut any = Vec::with_capacity(or_filters.len());
        for f in or_filters {
            any.push(condition_sql(q, f)?);
        }
        parts.push(format!("({})", any.join(" OR ")));
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

/// Page of documents ordered by the requested field, ties broken by name.
pub fn select_documents(schema: &str, query: &ListQuery) -> Result<QueryBuf, StoreError> {
    for f in &query.fields {
        validate_field(f)?;
    }
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, &query.doctype, &query.filters, &query.or_filters)?;
    let order_sql = match &query.order_by {
        Some(o) if o.field != "name" => format!(
            " ORDER BY {} {}, name ASC",
            column(&o.field)?.order_expr(),
            o.order.as_sql()
        ),
        Some(o) => format!(" ORDER BY name {}", o.order.as_sql()),
        None => " ORDER BY name ASC".into(),
    };
    let limit_sql = query.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_sql = if query.start > 0 {
        format!(" OFFSET {}", query.start)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        DOCUMENT_COLUMNS,
        documents_table(schema),
        where_sql,
        order_sql,
        limit_sql,
        offset_sql
    );
    Ok(q)
}

pub fn count_documents(schema: &str, doctype: &str, filters: &[Filter], or_filters: &[Filter]) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, doctype, filters, or_filters)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", documents_table(schema), where_sql);
    Ok(q)
}

/// `label, value` rows ordered by the earliest creation in each group.
pub fn aggregate_documents(schema: &str, query: &AggregateQuery) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let label = match &query.group_by {
        GroupBy::Field(f) => column(f)?.text_expr(),
        GroupBy::Day => "to_char(creation, 'YYYY-MM-DD')".into(),
        GroupBy::Week => "to_char(creation, 'IYYYIW')".into(),
        GroupBy::Month => "to_char(creation, 'Mon YYYY')".into(),
    };
    let value = match &query.measure {
        Measure::Count => "COUNT(*)::float8".to_string(),
        Measure::Sum(f) => format!("COALESCE(SUM(({})::numeric), 0)::float8", column(f)?.text_expr()),
    };
    let where_sql = where_clause(&mut q, &query.doctype, &query.filters, &[])?;
    q.sql = format!(
        "SELECT {} AS label, {} AS value FROM {}{} GROUP BY 1 ORDER BY MIN(creation), 1",
        label,
        value,
        documents_table(schema),
        where_sql
    );
    Ok(q)
}
