//! In-process store used by tests and `CRM_STORE=memory`.

use super::{
    apply_transition, check_deletable, check_savable, is_standard, strip_standard, validate_field,
    AggregateQuery, Bucket, Condition, DocStatus, Document, DocumentStore, Filter, GroupBy, ListQuery,
    Measure, NewDocument, SortOrder,
};
use crate::config::{doctype_meta, PlannedName};
use crate::dates::parse_datetime;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    docs: BTreeMap<(String, String), Document>,
    series: HashMap<String, u64>,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(doctype: &str, name: &str) -> (String, String) {
    (doctype.to_string(), name.to_string())
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Range comparison: numbers numerically, date-like strings chronologically, other strings lexically.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => as_number(a)?.partial_cmp(&as_number(b)?),
        (Value::String(x), Value::String(y)) => match (parse_datetime(x), parse_datetime(y)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.as_str().cmp(y.as_str())),
        },
        _ => None,
    }
}

/// JSON containment with the same rules as Postgres `@>`.
fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, nv)| h.get(k).map(|hv| json_contains(hv, nv)).unwrap_or(false)),
        (Value::Array(h), Value::Array(n)) => n.iter().all(|nv| h.iter().any(|hv| json_contains(hv, nv))),
        (Value::Array(h), scalar) if !scalar.is_object() => h.iter().any(|hv| values_equal(hv, scalar)),
        (a, b) => values_equal(a, b),
    }
}

fn like_regex(pattern: &str) -> Result<Regex, StoreError> {
    let mut re = String::from("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| StoreError::InvalidState(format!("bad pattern {}: {}", pattern, e)))
}

/// A filter with its LIKE pattern compiled once per query.
struct Compiled<'a> {
    filter: &'a Filter,
    like: Option<Regex>,
}

fn compile(filters: &[Filter]) -> Result<Vec<Compiled<'_>>, StoreError> {
    filters
        .iter()
        .map(|filter| {
            validate_field(&filter.field)?;
            let like = match &filter.cond {
                Condition::Like(p) => Some(like_regex(p)?),
                _ => None,
            };
            Ok(Compiled { filter, like })
        })
        .collect()
}

fn is_set(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn matches(doc: &Document, c: &Compiled<'_>) -> bool {
    let value = doc.value(&c.filter.field);
    let present = value.as_ref().filter(|v| !v.is_null());
    match &c.filter.cond {
        Condition::Eq(expected) => present.map(|v| values_equal(v, expected)).unwrap_or(false),
        Condition::Like(_) => match (present.and_then(value_text), &c.like) {
            (Some(text), Some(re)) => re.is_match(&text),
            _ => false,
        },
        Condition::In(list) => present.map(|v| list.iter().any(|x| values_equal(v, x))).unwrap_or(false),
        Condition::NotIn(list) => present.map(|v| !list.iter().any(|x| values_equal(v, x))).unwrap_or(true),
        Condition::Gt(b) => present.and_then(|v| compare(v, b)) == Some(Ordering::Greater),
        Condition::Gte(b) => matches!(present.and_then(|v| compare(v, b)), Some(Ordering::Greater | Ordering::Equal)),
        Condition::Lt(b) => present.and_then(|v| compare(v, b)) == Some(Ordering::Less),
        Condition::Lte(b) => matches!(present.and_then(|v| compare(v, b)), Some(Ordering::Less | Ordering::Equal)),
        Condition::Between(lo, hi) => present
            .map(|v| {
                matches!(compare(v, lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(v, hi), Some(Ordering::Less | Ordering::Equal))
            })
            .unwrap_or(false),
        Condition::IsSet(want) => is_set(value.as_ref()) == *want,
        Condition::Contains(needle) => present.map(|v| json_contains(v, needle)).unwrap_or(false),
    }
}

fn selected(doc: &Document, doctype: &str, all: &[Compiled<'_>], any: &[Compiled<'_>]) -> bool {
    doc.doctype == doctype && all.iter().all(|c| matches(doc, c)) && (any.is_empty() || any.iter().any(|c| matches(doc, c)))
}

/// Postgres jsonb ordering: null < string < number < boolean < array < object.
fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn sort_documents(docs: &mut [Document], query: &ListQuery) {
    docs.sort_by(|a, b| {
        let primary = match &query.order_by {
            Some(o) => {
                let av = a.value(&o.field).unwrap_or(Value::Null);
                let bv = b.value(&o.field).unwrap_or(Value::Null);
                let ord = order_values(&av, &bv);
                match o.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            }
            None => Ordering::Equal,
        };
        primary.then_with(|| a.name.cmp(&b.name))
    });
}

fn bucket_label(doc: &Document, group_by: &GroupBy) -> Option<String> {
    match group_by {
        GroupBy::Field(f) => doc.fields.get(f).and_then(value_text),
        GroupBy::Day => Some(doc.creation.format("%Y-%m-%d").to_string()),
        GroupBy::Week => {
            let week = doc.creation.iso_week();
            Some(format!("{}{:02}", week.year(), week.week()))
        }
        GroupBy::Month => Some(doc.creation.format("%b %Y").to_string()),
    }
}

fn not_found(doctype: &str, name: &str) -> StoreError {
    StoreError::not_found(doctype, name)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, doctype: &str, name: &str) -> Result<Document, StoreError> {
        let inner = self.inner.read().await;
        inner
            .docs
            .get(&key(doctype, name))
            .cloned()
            .ok_or_else(|| not_found(doctype, name))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Document>, StoreError> {
        for f in query.referenced_fields() {
            validate_field(f)?;
        }
        let all = compile(&query.filters)?;
        let any = compile(&query.or_filters)?;
        let inner = self.inner.read().await;
        let mut docs: Vec<Document> = inner
            .docs
            .values()
            .filter(|d| selected(d, &query.doctype, &all, &any))
            .cloned()
            .collect();
        drop(inner);
        sort_documents(&mut docs, query);
        let start = query.start as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(docs
            .into_iter()
            .skip(start)
            .take(limit)
            .map(|mut d| {
                d.retain_fields(&query.fields);
                d
            })
            .collect())
    }

    async fn count(&self, doctype: &str, filters: &[Filter], or_filters: &[Filter]) -> Result<u64, StoreError> {
        let all = compile(filters)?;
        let any = compile(or_filters)?;
        let inner = self.inner.read().await;
        Ok(inner.docs.values().filter(|d| selected(d, doctype, &all, &any)).count() as u64)
    }

    async fn insert(&self, new: NewDocument) -> Result<Document, StoreError> {
        let NewDocument {
            doctype,
            name,
            owner,
            mut fields,
        } = new;
        let now = Utc::now();
        let planned = match name {
            Some(n) => PlannedName::Fixed(n),
            None => doctype_meta(&doctype).plan_name(&doctype, &fields, now.date_naive())?,
        };
        strip_standard(&mut fields);
        let mut inner = self.inner.write().await;
        let name = match planned {
            PlannedName::Fixed(n) => n,
            PlannedName::Series { key, digits } => {
                let counter = inner.series.entry(key.clone()).or_insert(0);
                *counter += 1;
                PlannedName::with_counter(&key, digits, *counter)
            }
        };
        let k = key(&doctype, &name);
        if inner.docs.contains_key(&k) {
            return Err(StoreError::Duplicate { doctype, name });
        }
        let doc = Document {
            doctype,
            name,
            docstatus: DocStatus::Draft,
            owner,
            creation: now,
            modified: now,
            fields,
        };
        inner.docs.insert(k, doc.clone());
        Ok(doc)
    }

    async fn save(&self, doc: &Document) -> Result<Document, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .docs
            .get_mut(&key(&doc.doctype, &doc.name))
            .ok_or_else(|| not_found(&doc.doctype, &doc.name))?;
        check_savable(stored)?;
        let mut fields = doc.fields.clone();
        strip_standard(&mut fields);
        stored.fields = fields;
        stored.modified = Utc::now();
        Ok(stored.clone())
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
        let mut inner = self.inner.write().await;
        let stored = inner
            .docs
            .get_mut(&key(doctype, name))
            .ok_or_else(|| not_found(doctype, name))?;
        stored.fields.insert(field.to_string(), value);
        if update_modified {
            stored.modified = Utc::now();
        }
        Ok(())
    }

    async fn set_docstatus(&self, doctype: &str, name: &str, to: DocStatus) -> Result<Document, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .docs
            .get_mut(&key(doctype, name))
            .ok_or_else(|| not_found(doctype, name))?;
        let mut updated = stored.clone();
        apply_transition(&mut updated, to)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, doctype: &str, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let k = key(doctype, name);
        let stored = inner.docs.get(&k).ok_or_else(|| not_found(doctype, name))?;
        check_deletable(stored)?;
        inner.docs.remove(&k);
        Ok(())
    }

    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<Bucket>, StoreError> {
        for f in query.referenced_fields() {
            validate_field(f)?;
        }
        let all = compile(&query.filters)?;
        let inner = self.inner.read().await;
        // label -> (earliest creation, value)
        let mut groups: Vec<(Option<String>, DateTime<Utc>, f64)> = Vec::new();
        for doc in inner.docs.values().filter(|d| selected(d, &query.doctype, &all, &[])) {
            let label = bucket_label(doc, &query.group_by);
            let amount = match &query.measure {
                Measure::Count => 1.0,
                Measure::Sum(f) => doc.fields.get(f).and_then(as_number).unwrap_or(0.0),
            };
            match groups.iter_mut().find(|g| g.0 == label) {
                Some(g) => {
                    g.1 = g.1.min(doc.creation);
                    g.2 += amount;
                }
                None => groups.push((label, doc.creation, amount)),
            }
        }
        groups.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(groups
            .into_iter()
            .map(|(label, _, value)| Bucket { label, value })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for (first, status, email) in [
            ("Ada", "Open", "ada@example.com"),
            ("Grace", "Replied", "grace@example.com"),
            ("Linus", "Open", "linus@kernel.org"),
        ] {
            store
                .insert(NewDocument::new(
                    "Lead",
                    "Administrator",
                    fields(json!({"first_name": first, "status": status, "email_id": email})),
                ))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn series_names_increment_per_prefix() {
        let store = seeded().await;
        let year = Utc::now().year();
        assert!(store.exists("Lead", &format!("CRM-LEAD-{}-00003", year)).await.unwrap());
        assert!(!store.exists("Lead", &format!("CRM-LEAD-{}-00004", year)).await.unwrap());
    }

    #[tokio::test]
    async fn or_filters_widen_within_and_filters() {
        let store = seeded().await;
        let q = ListQuery::new("Lead")
            .filter(Filter::eq("status", "Open"))
            .or_filters(vec![
                Filter::contains_text("first_name", "ADA"),
                Filter::contains_text("email_id", "kernel"),
            ])
            .order_by("first_name", SortOrder::Desc);
        let names: Vec<String> = store
            .list(&q)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.fields["first_name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Linus", "Ada"]);
        assert_eq!(store.count("Lead", &[], &[]).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn not_in_includes_missing_fields() {
        let store = seeded().await;
        let n = store
            .count("Lead", &[Filter::not_in("source", vec![json!("Website")])], &[])
            .await
            .unwrap();
        assert_eq!(n, 3);
        let n = store
            .count("Lead", &[Filter::is_in("status", vec![])], &[])
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn field_named_duplicates_are_rejected() {
        let store = MemoryDocumentStore::new();
        let new = NewDocument::new("Customer", "Administrator", fields(json!({"customer_name": "Acme"})));
        store.insert(new.clone()).await.unwrap();
        assert!(matches!(store.insert(new).await, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn lifecycle_guards_save_delete_and_amend() {
        let store = MemoryDocumentStore::new();
        let so = store
            .insert(NewDocument::new("Sales Order", "Administrator", fields(json!({"customer": "Acme"}))))
            .await
            .unwrap();
        let submitted = store.set_docstatus("Sales Order", &so.name, DocStatus::Submitted).await.unwrap();
        assert_eq!(submitted.str_field("status"), Some("To Deliver and Bill"));
        assert!(matches!(store.save(&submitted).await, Err(StoreError::InvalidState(_))));
        assert!(store.delete("Sales Order", &so.name).await.is_err());
        assert!(store.amend("Sales Order", &so.name, "Administrator").await.is_err());

        store.set_docstatus("Sales Order", &so.name, DocStatus::Cancelled).await.unwrap();
        let amended = store.amend("Sales Order", &so.name, "Administrator").await.unwrap();
        assert_eq!(amended.name, format!("{}-1", so.name));
        assert_eq!(amended.docstatus, DocStatus::Draft);
        assert_eq!(amended.str_field("amended_from"), Some(so.name.as_str()));
        store.delete("Sales Order", &so.name).await.unwrap();
    }

    #[tokio::test]
    async fn set_value_can_leave_modified_alone() {
        let store = seeded().await;
        let lead = store.find_one("Lead", vec![Filter::eq("first_name", "Ada")]).await.unwrap().unwrap();
        store
            .set_value("Lead", &lead.name, "status", json!("Converted"), false)
            .await
            .unwrap();
        let after = store.get("Lead", &lead.name).await.unwrap();
        assert_eq!(after.modified, lead.modified);
        assert_eq!(after.str_field("status"), Some("Converted"));
        assert!(store.set_value("Lead", &lead.name, "name", json!("x"), true).await.is_err());
    }

    #[tokio::test]
    async fn contains_matches_child_rows() {
        let store = MemoryDocumentStore::new();
        store
            .insert(NewDocument::new(
                "Sales Invoice",
                "Administrator",
                fields(json!({"items": [{"item_code": "WIDGET", "qty": 2}]})),
            ))
            .await
            .unwrap();
        let hit = Filter::json_contains("items", json!([{"item_code": "WIDGET"}]));
        let miss = Filter::json_contains("items", json!([{"item_code": "GADGET"}]));
        assert_eq!(store.count("Sales Invoice", &[hit], &[]).await.unwrap(), 1);
        assert_eq!(store.count("Sales Invoice", &[miss], &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn aggregate_groups_and_sums() {
        let store = MemoryDocumentStore::new();
        for (territory, amount) in [("North", 100.0), ("South", 50.0), ("North", 25.5)] {
            store
                .insert(NewDocument::new(
                    "Opportunity",
                    "Administrator",
                    fields(json!({"territory": territory, "opportunity_amount": amount})),
                ))
                .await
                .unwrap();
        }
        let q = AggregateQuery::new("Opportunity", GroupBy::Field("territory".into()), Measure::Sum("opportunity_amount".into()));
        let buckets = store.aggregate(&q).await.unwrap();
        assert_eq!(
            buckets,
            vec![
                Bucket { label: Some("North".into()), value: 125.5 },
                Bucket { label: Some("South".into()), value: 50.0 },
            ]
        );
        let by_day = store
            .aggregate(&AggregateQuery::new("Opportunity", GroupBy::Day, Measure::Count))
            .await
            .unwrap();
        assert_eq!(by_day.len(), 1);
        assert_eq!(by_day[0].value, 3.0);
    }

    #[tokio::test]
    async fn creation_range_accepts_plain_dates() {
        let store = seeded().await;
        let today = Utc::now().date_naive();
        let tomorrow = today.succ_opt().unwrap();
        let n = store
            .count(
                "Lead",
                &[
                    Filter::gte("creation", today.format("%Y-%m-%d").to_string()),
                    Filter::lt("creation", tomorrow.format("%Y-%m-%d").to_string()),
                ],
                &[],
            )
            .await
            .unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn invalid_field_names_are_refused() {
        let store = seeded().await;
        let q = ListQuery::new("Lead").filter(Filter::eq("first name", "Ada"));
        assert!(matches!(store.list(&q).await, Err(StoreError::InvalidField(_))));
    }
}
