//! Document layer: every business record is a document with a doctype, a unique name,
//! a lifecycle flag and a free-form field map. Handlers talk to it only through [`DocumentStore`].

mod filter;
mod memory;
mod postgres;

pub use filter::*;
pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

use crate::config::doctype_meta;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Draft=0, Submitted=1, Cancelled=2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum DocStatus {
    Draft,
    Submitted,
    Cancelled,
}

impl DocStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            DocStatus::Draft => 0,
            DocStatus::Submitted => 1,
            DocStatus::Cancelled => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocStatus::Draft => "Draft",
            DocStatus::Submitted => "Submitted",
            DocStatus::Cancelled => "Cancelled",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "Draft" => Some(DocStatus::Draft),
            "Submitted" => Some(DocStatus::Submitted),
            "Cancelled" => Some(DocStatus::Cancelled),
            _ => None,
        }
    }
}

impl From<DocStatus> for i64 {
    fn from(s: DocStatus) -> i64 {
        s.as_i64()
    }
}

impl TryFrom<i64> for DocStatus {
    type Error = String;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        match n {
            0 => Ok(DocStatus::Draft),
            1 => Ok(DocStatus::Submitted),
            2 => Ok(DocStatus::Cancelled),
            other => Err(format!("invalid docstatus {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doctype: String,
    pub name: String,
    pub docstatus: DocStatus,
    pub owner: String,
    pub creation: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

pub(crate) fn timestamp_value(t: &DateTime<Utc>) -> Value {
    Value::String(t.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl Document {
    /// Value of a standard or map field. Timestamps are RFC 3339 strings.
    pub fn value(&self, field: &str) -> Option<Value> {
        match field {
            "name" => Some(Value::String(self.name.clone())),
            "owner" => Some(Value::String(self.owner.clone())),
            "docstatus" => Some(Value::from(self.docstatus.as_i64())),
            "creation" => Some(timestamp_value(&self.creation)),
            "modified" => Some(timestamp_value(&self.modified)),
            "doctype" => Some(Value::String(self.doctype.clone())),
            other => self.fields.get(other).cloned(),
        }
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn table(&self, field: &str) -> &[Value] {
        self.fields
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Object with the requested fields; absent ones are null.
    pub fn project(&self, fields: &[&str]) -> Value {
        let mut out = Map::new();
        for f in fields {
            out.insert(f.to_string(), self.value(f).unwrap_or(Value::Null));
        }
        Value::Object(out)
    }

    /// Whole document as one flat object.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for f in ["doctype", "name", "owner", "docstatus", "creation", "modified"] {
            out.insert(f.to_string(), self.value(f).unwrap_or(Value::Null));
        }
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }

    pub(crate) fn retain_fields(&mut self, keep: &[String]) {
        if !keep.is_empty() {
            self.fields.retain(|k, _| keep.iter().any(|f| f == k));
        }
    }
}

/// Input for [`DocumentStore::insert`]. `name` overrides the doctype's naming rule.
#[derive(Clone, Debug)]
pub struct NewDocument {
    pub doctype: String,
    pub name: Option<String>,
    pub owner: String,
    pub fields: Map<String, Value>,
}

impl NewDocument {
    pub fn new(doctype: impl Into<String>, owner: impl Into<String>, fields: Map<String, Value>) -> Self {
        NewDocument {
            doctype: doctype.into(),
            name: None,
            owner: owner.into(),
            fields,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Standard keys never live in the field map.
pub(crate) fn strip_standard(fields: &mut Map<String, Value>) {
    for key in STANDARD_FIELDS.iter().copied().chain(["doctype"]) {
        fields.remove(key);
    }
}

/// Checks a lifecycle transition and stamps the doctype's status label on the document.
pub(crate) fn apply_transition(doc: &mut Document, to: DocStatus) -> Result<(), StoreError> {
    let meta = doctype_meta(&doc.doctype);
    if !meta.submittable {
        return Err(StoreError::InvalidState(format!("{} is not submittable", doc.doctype)));
    }
    let label = match (doc.docstatus, to) {
        (DocStatus::Draft, DocStatus::Submitted) => meta.submitted_status.unwrap_or("Submitted"),
        (DocStatus::Submitted, DocStatus::Cancelled) => "Cancelled",
        (from, to) => {
            return Err(StoreError::InvalidState(format!(
                "Cannot change {} {} from {} to {}",
                doc.doctype,
                doc.name,
                from.label(),
                to.label()
            )))
        }
    };
    doc.docstatus = to;
    doc.set("status", label);
    doc.modified = Utc::now();
    Ok(())
}

pub(crate) fn check_savable(doc: &Document) -> Result<(), StoreError> {
    if doc.docstatus != DocStatus::Draft {
        return Err(StoreError::InvalidState(format!(
            "Cannot edit {} {} once it is {}",
            doc.doctype,
            doc.name,
            doc.docstatus.label()
        )));
    }
    Ok(())
}

pub(crate) fn check_deletable(doc: &Document) -> Result<(), StoreError> {
    if doc.docstatus == DocStatus::Submitted {
        return Err(StoreError::InvalidState(format!(
            "Submitted {} {} must be cancelled before deletion",
            doc.doctype, doc.name
        )));
    }
    Ok(())
}

/// `SO-1` amended once becomes `SO-1-1`, amending `SO-1-1` gives `SO-1-2`.
pub(crate) fn amended_name(doc: &Document) -> String {
    if doc.str_field("amended_from").is_some() {
        if let Some((base, n)) = doc.name.rsplit_once('-') {
            if let Ok(n) = n.parse::<u32>() {
                return format!("{}-{}", base, n + 1);
            }
        }
    }
    format!("{}-1", doc.name)
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, doctype: &str, name: &str) -> Result<Document, StoreError>;

    async fn exists(&self, doctype: &str, name: &str) -> Result<bool, StoreError> {
        match self.get(doctype, name).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// First document matching all filters, ordered by name.
    async fn find_one(&self, doctype: &str, filters: Vec<Filter>) -> Result<Option<Document>, StoreError> {
        let query = ListQuery::new(doctype)
            .filters(filters)
            .order_by("name", SortOrder::Asc)
            .limit(1);
        Ok(self.list(&query).await?.into_iter().next())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, doctype: &str, filters: &[Filter], or_filters: &[Filter]) -> Result<u64, StoreError>;

    /// Names the document per its doctype and stores it as Draft.
    async fn insert(&self, doc: NewDocument) -> Result<Document, StoreError>;

    /// Replaces the field map of a Draft document.
    async fn save(&self, doc: &Document) -> Result<Document, StoreError>;

    /// Writes one field regardless of lifecycle state.
    async fn set_value(
        &self,
        doctype: &str,
        name: &str,
        field: &str,
        value: Value,
        update_modified: bool,
    ) -> Result<(), StoreError>;

    /// Draft to Submitted or Submitted to Cancelled.
    async fn set_docstatus(&self, doctype: &str, name: &str, to: DocStatus) -> Result<Document, StoreError>;

    async fn delete(&self, doctype: &str, name: &str) -> Result<(), StoreError>;

    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<Bucket>, StoreError>;

    /// Copies a Cancelled document into a new Draft that records `amended_from`.
    async fn amend(&self, doctype: &str, name: &str, owner: &str) -> Result<Document, StoreError> {
        let source = self.get(doctype, name).await?;
        if source.docstatus != DocStatus::Cancelled {
            return Err(StoreError::InvalidState(format!(
                "Only cancelled {} can be amended",
                doctype_meta(doctype).plural
            )));
        }
        let new_name = amended_name(&source);
        let mut fields = source.fields;
        fields.insert("amended_from".into(), Value::String(source.name));
        fields.insert("status".into(), Value::String("Draft".into()));
        self.insert(NewDocument::new(doctype, owner, fields).named(new_name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(doctype: &str, name: &str, status: DocStatus) -> Document {
        Document {
            doctype: doctype.into(),
            name: name.into(),
            docstatus: status,
            owner: "Administrator".into(),
            creation: Utc::now(),
            modified: Utc::now(),
            fields: Map::new(),
        }
    }

    #[test]
    fn docstatus_serializes_as_integer() {
        let d = doc("Sales Order", "SAL-ORD-2025-00001", DocStatus::Submitted);
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["docstatus"], 1);
        let back: Document = serde_json::from_value(v).unwrap();
        assert_eq!(back.docstatus, DocStatus::Submitted);
        assert!(serde_json::from_value::<DocStatus>(json!(7)).is_err());
    }

    #[test]
    fn transitions_set_status_labels() {
        let mut d = doc("Sales Order", "SO-1", DocStatus::Draft);
        apply_transition(&mut d, DocStatus::Submitted).unwrap();
        assert_eq!(d.str_field("status"), Some("To Deliver and Bill"));
        apply_transition(&mut d, DocStatus::Cancelled).unwrap();
        assert_eq!(d.str_field("status"), Some("Cancelled"));
        assert!(apply_transition(&mut d, DocStatus::Submitted).is_err());
    }

    #[test]
    fn non_submittable_doctypes_refuse_transitions() {
        let mut d = doc("Lead", "CRM-LEAD-2025-00001", DocStatus::Draft);
        assert!(apply_transition(&mut d, DocStatus::Submitted).is_err());
    }

    #[test]
    fn amended_names_increment() {
        let mut d = doc("Sales Invoice", "ACC-SINV-2025-00001", DocStatus::Cancelled);
        assert_eq!(amended_name(&d), "ACC-SINV-2025-00001-1");
        d.name = "ACC-SINV-2025-00001-1".into();
        d.set("amended_from", "ACC-SINV-2025-00001");
        assert_eq!(amended_name(&d), "ACC-SINV-2025-00001-2");
    }

    #[test]
    fn project_fills_missing_with_null() {
        let mut d = doc("Lead", "L-1", DocStatus::Draft);
        d.set("first_name", "Ada");
        let v = d.project(&["name", "first_name", "email_id"]);
        assert_eq!(v, json!({"name": "L-1", "first_name": "Ada", "email_id": null}));
    }
}
