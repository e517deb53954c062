//! Item endpoints. Listed rates come from the selling Item Price of a price list.

use crate::error::{not_found_as, AppError, LogFailure, StoreError};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::success_flat;
use crate::service::{eq_filters, fetch_page, field_map, required, ListSpec, PageRequest, RequestValidator};
use crate::state::AppState;
use crate::store::{DocumentStore, Filter, ListQuery, NewDocument};
use axum::{extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

const ITEMS: ListSpec = ListSpec::new(
    "Item",
    &["name", "item_code", "item_name", "item_group", "is_stock_item", "modified"],
)
.search(&["item_code", "item_name"])
.page_size(20);

const DEFAULT_PRICE_LIST: &str = "Standard Selling";

/// Doctypes whose `items` rows keep an item from being deleted.
const TRANSACTION_DOCTYPES: &[&str] = &["Sales Invoice", "Delivery Note", "Purchase Invoice"];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ItemFields {
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub item_group: Option<String>,
    pub description: Option<String>,
    pub stock_uom: Option<String>,
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub is_stock_item: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub disabled: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub standard_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub valuation_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub opening_stock: Option<f64>,
}

pub async fn create_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<ItemFields>,
) -> Result<impl IntoResponse, AppError> {
    RequestValidator::require(&[("item_code", input.item_code.as_deref())])?;
    let mut fields = field_map(&input)?;
    if let Some(code) = &input.item_code {
        fields.entry("item_name").or_insert_with(|| json!(code));
    }
    let item = state
        .store
        .insert(NewDocument::new("Item", &ctx.user, fields))
        .await
        .log_failure("create item")?;
    Ok(success_flat(
        json!({ "item": item.name }),
        &format!("Item {} created", item.name),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    pub item_group: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    pub is_stock_item: Option<bool>,
    pub price_list: Option<String>,
}

/// `item_code -> price_list_rate` for the selling prices of `price_list`.
async fn selling_rates(
    store: &dyn DocumentStore,
    price_list: &str,
    codes: Vec<Value>,
) -> Result<HashMap<String, Value>, StoreError> {
    if codes.is_empty() {
        return Ok(HashMap::new());
    }
    let query = ListQuery::new("Item Price")
        .fields(&["item_code", "price_list_rate"])
        .filters(vec![
            Filter::is_in("item_code", codes),
            Filter::eq("price_list", price_list),
            Filter::eq("selling", 1),
        ]);
    Ok(store
        .list(&query)
        .await?
        .into_iter()
        .filter_map(|p| {
            let code = p.str_field("item_code")?.to_string();
            Some((code, p.value("price_list_rate").unwrap_or(json!(0))))
        })
        .collect())
}

/// Each row carries `rate` and `amount` (quantity one); items without a price get 0.
pub async fn list_items(
    State(state): State<AppState>,
    Payload(params): Payload<ItemListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut filters = eq_filters(&[("item_group", params.item_group.as_deref())]);
    if let Some(stock) = params.is_stock_item {
        filters.push(Filter::eq("is_stock_item", i64::from(stock)));
    }
    let page = fetch_page(state.store(), &ITEMS, &params.page, filters).await?;
    let price_list = params
        .price_list
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_PRICE_LIST);
    let codes = page
        .results
        .iter()
        .filter_map(|i| i.value("item_code"))
        .collect();
    let rates = selling_rates(state.store(), price_list, codes).await?;
    let rows = page
        .rows(ITEMS.fields)
        .into_iter()
        .map(|mut row| {
            let rate = row
                .get("item_code")
                .and_then(Value::as_str)
                .and_then(|code| rates.get(code).cloned())
                .unwrap_or(json!(0));
            if let Some(obj) = row.as_object_mut() {
                obj.insert("rate".into(), rate.clone());
                obj.insert("amount".into(), rate);
            }
            row
        })
        .collect();
    Ok(page.transactional(rows, "Items fetched successfully"))
}

/// The fields an existing item accepts.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ItemChanges {
    pub item_name: Option<String>,
    pub item_group: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub is_stock_item: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub disabled: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateItem {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub changes: ItemChanges,
}

fn missing(name: &str) -> impl FnOnce(StoreError) -> AppError {
    not_found_as(format!("Item {} not found", name))
}

pub async fn update_item(
    State(state): State<AppState>,
    Payload(input): Payload<UpdateItem>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Item name")?;
    let mut item = state.store.get("Item", name).await.map_err(missing(name))?;
    item.fields.extend(field_map(&input.changes)?);
    let item = state.store.save(&item).await.log_failure("update item")?;
    Ok(success_flat(item.to_value(), &format!("Item {} updated successfully", name)))
}

async fn is_linked(store: &dyn DocumentStore, item_code: &str) -> Result<bool, StoreError> {
    for doctype in TRANSACTION_DOCTYPES {
        let row = json!([{ "item_code": item_code }]);
        if store.find_one(doctype, vec![Filter::json_contains("items", row)]).await?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
}

/// Items used on transactions are disabled rather than deleted.
pub async fn delete_item(
    State(state): State<AppState>,
    Payload(input): Payload<ItemRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Item name")?;
    let mut item = state.store.get("Item", name).await.map_err(missing(name))?;
    let code = item.str_field("item_code").unwrap_or(name).to_string();
    if is_linked(state.store(), &code).await.log_failure("delete item")? {
        item.set("disabled", 1);
        state.store.save(&item).await.log_failure("delete item")?;
        return Ok(success_flat(
            json!({ "item": name, "disabled": 1 }),
            &format!("Item {} is linked to transactions and has been disabled instead", name),
        ));
    }
    state.store.delete("Item", name).await.log_failure("delete item")?;
    Ok(success_flat(json!({ "item": name }), &format!("Item {} deleted successfully", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    async fn insert(store: &MemoryDocumentStore, doctype: &str, v: Value) {
        let Value::Object(fields) = v else { panic!("object expected") };
        store.insert(NewDocument::new(doctype, "Administrator", fields)).await.unwrap();
    }

    #[tokio::test]
    async fn items_on_invoices_count_as_linked() {
        let store = MemoryDocumentStore::new();
        insert(&store, "Sales Invoice", json!({"items": [{"item_code": "PEN", "qty": 1}]})).await;
        assert!(is_linked(&store, "PEN").await.unwrap());
        assert!(!is_linked(&store, "INK").await.unwrap());
    }

    #[tokio::test]
    async fn rates_come_from_selling_prices_of_the_list() {
        let store = MemoryDocumentStore::new();
        insert(&store, "Item Price", json!({"item_code": "PEN", "price_list": "Standard Selling", "selling": 1, "price_list_rate": 12.5})).await;
        insert(&store, "Item Price", json!({"item_code": "PEN", "price_list": "Standard Buying", "selling": 0, "price_list_rate": 9})).await;
        let rates = selling_rates(&store, "Standard Selling", vec![json!("PEN"), json!("INK")]).await.unwrap();
        assert_eq!(rates.get("PEN"), Some(&json!(12.5)));
        assert!(!rates.contains_key("INK"));
    }

    #[test]
    fn changes_ignore_fields_outside_the_allowed_set() {
        let input: UpdateItem = serde_json::from_value(json!({
            "name": "PEN",
            "item_name": "Blue Pen",
            "stock_uom": "Box",
            "disabled": "true"
        }))
        .unwrap();
        let changes = field_map(&input.changes).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["disabled"], json!(1));
    }
}
