//! Doctype metadata: how documents are named and whether they follow the submit/cancel lifecycle.

use crate::error::StoreError;
use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Naming {
    /// `<prefix><YYYY>-<counter>` when yearly, else `<prefix><counter>`.
    Series { prefix: &'static str, yearly: bool, digits: usize },
    /// Name taken from a field value, or an explicit `name`.
    Field(&'static str),
    /// Explicit `name`, else a short random hash.
    Hash,
}

#[derive(Clone, Copy, Debug)]
pub struct DocTypeMeta {
    pub name: &'static str,
    /// Used in lifecycle messages ("Only Draft Sales Orders ...").
    pub plural: &'static str,
    pub naming: Naming,
    pub submittable: bool,
    /// `status` written on submit.
    pub submitted_status: Option<&'static str>,
}

const fn series(prefix: &'static str) -> Naming {
    Naming::Series { prefix, yearly: true, digits: 5 }
}

const fn meta(name: &'static str, plural: &'static str, naming: Naming) -> DocTypeMeta {
    DocTypeMeta {
        name,
        plural,
        naming,
        submittable: false,
        submitted_status: None,
    }
}

const fn submittable(name: &'static str, plural: &'static str, naming: Naming, status: &'static str) -> DocTypeMeta {
    DocTypeMeta {
        name,
        plural,
        naming,
        submittable: true,
        submitted_status: Some(status),
    }
}

pub const DOCTYPES: &[DocTypeMeta] = &[
    meta("Lead", "Leads", series("CRM-LEAD-")),
    meta("Opportunity", "Opportunities", series("CRM-OPP-")),
    submittable("Quotation", "quotations", series("SAL-QTN-"), "Open"),
    submittable("Sales Order", "Sales Orders", series("SAL-ORD-"), "To Deliver and Bill"),
    submittable("Delivery Note", "Delivery Notes", series("MAT-DN-"), "To Bill"),
    submittable("Sales Invoice", "Sales Invoices", series("ACC-SINV-"), "Unpaid"),
    submittable("Purchase Invoice", "Purchase Invoices", series("ACC-PINV-"), "Unpaid"),
    meta("Customer", "Customers", Naming::Field("customer_name")),
    meta("Supplier", "Suppliers", Naming::Field("supplier_name")),
    meta("Item", "Items", Naming::Field("item_code")),
    meta("Item Price", "Item Prices", Naming::Hash),
    meta("Price List", "Price Lists", Naming::Field("price_list_name")),
    meta("Warehouse", "Warehouses", Naming::Field("warehouse_name")),
    meta("Lead Source", "Lead Sources", Naming::Field("source_name")),
    meta("Company", "Companies", Naming::Field("company_name")),
    meta("Territory", "Territories", Naming::Field("territory_name")),
    meta("Industry Type", "Industry Types", Naming::Field("industry")),
    meta("Country", "Countries", Naming::Field("country_name")),
    meta("Language", "Languages", Naming::Field("language_code")),
    meta("Gender", "Genders", Naming::Field("gender")),
    meta("Campaign", "Campaigns", Naming::Field("campaign_name")),
    meta("Customer Group", "Customer Groups", Naming::Field("customer_group_name")),
    meta("Market Segment", "Market Segments", Naming::Field("market_segment")),
    meta("Sales Stage", "Sales Stages", Naming::Field("stage_name")),
    meta("Opportunity Type", "Opportunity Types", Naming::Field("name")),
    meta("CRM Master", "CRM Masters", Naming::Hash),
    meta("Prospect", "Prospects", Naming::Field("company_name")),
    meta("Contact", "Contacts", Naming::Hash),
    meta("User", "Users", Naming::Field("email")),
    meta("Employee", "Employees", Naming::Series { prefix: "HR-EMP-", yearly: false, digits: 5 }),
    meta("Event", "Events", Naming::Series { prefix: "EV", yearly: false, digits: 5 }),
    meta("ToDo", "ToDos", Naming::Hash),
    meta("Email Queue", "Email Queue", Naming::Hash),
];

const FALLBACK: DocTypeMeta = meta("", "documents", Naming::Hash);

/// Metadata for a doctype; unknown doctypes are hash-named and not submittable.
pub fn doctype_meta(doctype: &str) -> DocTypeMeta {
    DOCTYPES
        .iter()
        .find(|m| m.name == doctype)
        .copied()
        .unwrap_or(FALLBACK)
}

/// Name decided before insert. Series names need a counter from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlannedName {
    Fixed(String),
    Series { key: String, digits: usize },
}

impl PlannedName {
    pub fn with_counter(key: &str, digits: usize, n: u64) -> String {
        format!("{}{:0width$}", key, n, width = digits)
    }
}

fn explicit_name(fields: &Map<String, Value>, field: &str) -> Option<String> {
    fields
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl DocTypeMeta {
    pub fn plan_name(&self, doctype: &str, fields: &Map<String, Value>, today: NaiveDate) -> Result<PlannedName, StoreError> {
        match self.naming {
            Naming::Series { prefix, yearly, digits } => {
                let key = if yearly {
                    format!("{}{}-", prefix, today.year())
                } else {
                    prefix.to_string()
                };
                Ok(PlannedName::Series { key, digits })
            }
            Naming::Field(field) => explicit_name(fields, field)
                .or_else(|| explicit_name(fields, "name"))
                .map(PlannedName::Fixed)
                .ok_or_else(|| StoreError::InvalidState(format!("{} is required to name a {}", field, doctype))),
            Naming::Hash => Ok(PlannedName::Fixed(explicit_name(fields, "name").unwrap_or_else(|| {
                let mut hash = uuid::Uuid::new_v4().simple().to_string();
                hash.truncate(10);
                hash
            }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn yearly_series_includes_year() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let planned = doctype_meta("Lead").plan_name("Lead", &Map::new(), today).unwrap();
        assert_eq!(
            planned,
            PlannedName::Series {
                key: "CRM-LEAD-2025-".into(),
                digits: 5
            }
        );
        assert_eq!(PlannedName::with_counter("CRM-LEAD-2025-", 5, 7), "CRM-LEAD-2025-00007");
    }

    #[test]
    fn field_naming_uses_field_then_name() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let m = doctype_meta("Customer");
        assert_eq!(
            m.plan_name("Customer", &fields(json!({"customer_name": "Acme"})), today).unwrap(),
            PlannedName::Fixed("Acme".into())
        );
        assert!(m.plan_name("Customer", &Map::new(), today).is_err());
    }

    #[test]
    fn unknown_doctype_is_hash_named() {
        let m = doctype_meta("Note");
        assert!(!m.submittable);
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        match m.plan_name("Note", &Map::new(), today).unwrap() {
            PlannedName::Fixed(n) => assert_eq!(n.len(), 10),
            other => panic!("unexpected {:?}", other),
        }
    }
}
