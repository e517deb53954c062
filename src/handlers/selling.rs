//! Child rows and party/item helpers shared by the selling documents.

use crate::error::{AppError, StoreError};
use crate::extractors::lenient;
use crate::service::table;
use crate::store::{Document, DocumentStore, NewDocument};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// `items` row. `quantity` is accepted for `qty`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ItemRow {
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub description: Option<String>,
    #[serde(default, alias = "quantity", deserialize_with = "lenient::opt_f64")]
    pub qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub rate: Option<f64>,
    pub uom: Option<String>,
    pub stock_uom: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub conversion_factor: Option<f64>,
    pub warehouse: Option<String>,
    pub delivery_date: Option<String>,
    pub sales_order: Option<String>,
    pub so_detail: Option<String>,
    pub against_sales_order: Option<String>,
}

/// `taxes` row. Accepts `type`/`tax_rate` as well as the stored names.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TaxRow {
    #[serde(alias = "type")]
    pub charge_type: Option<String>,
    pub account_head: Option<String>,
    pub description: Option<String>,
    #[serde(default, alias = "tax_rate", deserialize_with = "lenient::opt_f64")]
    pub rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub tax_amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PaymentRow {
    pub payment_term: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub invoice_portion: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub payment_amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SalesTeamRow {
    pub sales_person: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub allocated_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub commission_rate: Option<f64>,
}

/// Replaces `key` with the given rows when the caller sent the table.
pub fn put_table<T: Serialize>(fields: &mut Map<String, Value>, key: &str, rows: &Option<Vec<T>>) -> Result<(), AppError> {
    if let Some(rows) = rows {
        fields.insert(key.to_string(), table(rows)?);
    }
    Ok(())
}

/// Rows of a child table with selected fields, renamed `(output, stored)`.
pub fn project_rows(doc: &Document, table: &str, fields: &[(&str, &str)]) -> Value {
    doc.table(table)
        .iter()
        .map(|row| {
            let out: Map<String, Value> = fields
                .iter()
                .map(|(out, stored)| (out.to_string(), row.get(*stored).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(out)
        })
        .collect()
}

/// Creates the Customer or Supplier named `party` when it does not exist yet.
/// Other party types are left alone.
pub async fn ensure_party(
    store: &dyn DocumentStore,
    owner: &str,
    party_type: Option<&str>,
    party: &str,
) -> Result<(), StoreError> {
    let (doctype, name_field) = match party_type {
        Some("Customer") => ("Customer", "customer_name"),
        Some("Supplier") => ("Supplier", "supplier_name"),
        _ => return Ok(()),
    };
    if store.exists(doctype, party).await? {
        return Ok(());
    }
    let mut fields = Map::new();
    fields.insert(name_field.into(), json!(party));
    store.insert(NewDocument::new(doctype, owner, fields)).await?;
    tracing::info!(doctype, party, "party created");
    Ok(())
}

/// Creates a non-stock Item (UOM `Nos`) for an unknown item code.
pub async fn ensure_item(store: &dyn DocumentStore, owner: &str, item_code: &str) -> Result<(), StoreError> {
    if store.exists("Item", item_code).await? {
        return Ok(());
    }
    let fields = json!({
        "item_code": item_code,
        "item_name": item_code,
        "stock_uom": "Nos",
        "is_stock_item": 0,
    });
    if let Value::Object(fields) = fields {
        store.insert(NewDocument::new("Item", owner, fields)).await?;
    }
    tracing::info!(item_code, "item created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    #[test]
    fn tax_rows_accept_short_names() {
        let row: TaxRow = serde_json::from_value(json!({"type": "On Net Total", "tax_rate": "18"})).unwrap();
        assert_eq!(row.charge_type.as_deref(), Some("On Net Total"));
        assert_eq!(row.rate, Some(18.0));
    }

    #[test]
    fn tables_drop_absent_cells() {
        let rows = vec![ItemRow {
            item_code: Some("PEN".into()),
            qty: Some(2.0),
            ..Default::default()
        }];
        let mut fields = Map::new();
        put_table(&mut fields, "items", &Some(rows)).unwrap();
        put_table::<TaxRow>(&mut fields, "taxes", &None).unwrap();
        assert_eq!(fields["items"], json!([{"item_code": "PEN", "qty": 2.0}]));
        assert!(!fields.contains_key("taxes"));
    }

    #[tokio::test]
    async fn parties_and_items_are_created_once() {
        let store = MemoryDocumentStore::new();
        ensure_party(&store, "Administrator", Some("Customer"), "Acme").await.unwrap();
        ensure_party(&store, "Administrator", Some("Customer"), "Acme").await.unwrap();
        ensure_party(&store, "Administrator", Some("Lead"), "Nobody").await.unwrap();
        assert!(store.exists("Customer", "Acme").await.unwrap());
        assert!(!store.exists("Lead", "Nobody").await.unwrap());

        ensure_item(&store, "Administrator", "PEN").await.unwrap();
        ensure_item(&store, "Administrator", "PEN").await.unwrap();
        let item = store.get("Item", "PEN").await.unwrap();
        assert_eq!(item.str_field("stock_uom"), Some("Nos"));
    }
}
