//! Query descriptions shared by every store backend.

use crate::error::StoreError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Columns every document carries outside of its field map.
pub const STANDARD_FIELDS: &[&str] = &["name", "owner", "docstatus", "creation", "modified"];

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static regex"))
}

/// Field names reach SQL as JSON keys or column names; only plain identifiers are allowed.
pub fn validate_field(field: &str) -> Result<(), StoreError> {
    if field_re().is_match(field) {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

pub fn is_standard(field: &str) -> bool {
    STANDARD_FIELDS.contains(&field)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(Value),
    /// Case-insensitive SQL pattern with `%` and `_` wildcards.
    Like(String),
    In(Vec<Value>),
    /// A missing field counts as not in the list.
    NotIn(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Inclusive on both ends.
    Between(Value, Value),
    /// `true`: present, non-null and not an empty string.
    IsSet(bool),
    /// JSON containment, used for child tables.
    Contains(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub cond: Condition,
}

impl Filter {
    pub fn new(field: impl Into<String>, cond: Condition) -> Self {
        Filter {
            field: field.into(),
            cond,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Eq(value.into()))
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, Condition::Like(pattern.into()))
    }

    /// `%term%` match.
    pub fn contains_text(field: impl Into<String>, term: &str) -> Self {
        Self::like(field, format!("%{}%", term))
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Condition::In(values))
    }

    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Condition::NotIn(values))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Gte(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Condition::Lt(value.into()))
    }

    pub fn is_set(field: impl Into<String>) -> Self {
        Self::new(field, Condition::IsSet(true))
    }

    pub fn json_contains(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Condition::Contains(value))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// `desc` (any case) is descending; everything else ascending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

/// A filtered, ordered and optionally paged document listing.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub doctype: String,
    /// Field map keys to keep on each result; empty keeps all.
    pub fields: Vec<String>,
    pub filters: Vec<Filter>,
    pub or_filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub start: u64,
    pub limit: Option<u64>,
}

impl ListQuery {
    pub fn new(doctype: impl Into<String>) -> Self {
        ListQuery {
            doctype: doctype.into(),
            ..Default::default()
        }
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn or_filters(mut self, filters: Vec<Filter>) -> Self {
        self.or_filters.extend(filters);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            order,
        });
        self
    }

    pub fn page(mut self, start: u64, limit: u64) -> Self {
        self.start = start;
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every field name the query touches, for validation.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .chain(self.filters.iter().map(|f| f.field.as_str()))
            .chain(self.or_filters.iter().map(|f| f.field.as_str()))
            .chain(self.order_by.iter().map(|o| o.field.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GroupBy {
    Field(String),
    /// `YYYY-MM-DD` of creation.
    Day,
    /// ISO week of creation, `GGGGVV`.
    Week,
    /// `Mon YYYY` of creation.
    Month,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Measure {
    Count,
    Sum(String),
}

#[derive(Clone, Debug)]
pub struct AggregateQuery {
    pub doctype: String,
    pub filters: Vec<Filter>,
    pub group_by: GroupBy,
    pub measure: Measure,
}

impl AggregateQuery {
    pub fn new(doctype: impl Into<String>, group_by: GroupBy, measure: Measure) -> Self {
        AggregateQuery {
            doctype: doctype.into(),
            filters: Vec::new(),
            group_by,
            measure,
        }
    }

    pub fn filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        let group = match &self.group_by {
            GroupBy::Field(f) => Some(f.as_str()),
            _ => None,
        };
        let measure = match &self.measure {
            Measure::Sum(f) => Some(f.as_str()),
            Measure::Count => None,
        };
        self.filters
            .iter()
            .map(|f| f.field.as_str())
            .chain(group)
            .chain(measure)
    }
}

/// One aggregate group. `label` is None for documents missing the group field.
#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    pub label: Option<String>,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_must_be_identifiers() {
        assert!(validate_field("party_name").is_ok());
        assert!(validate_field("_x1").is_ok());
        assert!(validate_field("Party").is_err());
        assert!(validate_field("a->>'b'").is_err());
        assert!(validate_field("").is_err());
    }

    #[test]
    fn only_desc_sorts_descending() {
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse(" desc "), SortOrder::Desc);
        assert_eq!(SortOrder::parse("descending"), SortOrder::Asc);
        assert_eq!(SortOrder::parse(""), SortOrder::Asc);
    }

    #[test]
    fn referenced_fields_cover_filters_and_order() {
        let q = ListQuery::new("Lead")
            .fields(&["first_name"])
            .filter(Filter::eq("status", "Open"))
            .or_filters(vec![Filter::contains_text("email_id", "x")])
            .order_by("modified", SortOrder::Desc);
        let fields: Vec<&str> = q.referenced_fields().collect();
        assert_eq!(fields, vec!["first_name", "status", "email_id", "modified"]);
    }
}
