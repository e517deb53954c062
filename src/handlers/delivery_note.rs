//! Delivery Note endpoints.

use super::selling::{put_table, ItemRow, SalesTeamRow, TaxRow};
use crate::error::{not_found_as, AppError, LogFailure, StoreError};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::{created_flat, success_flat};
use crate::service::{apply_totals, eq_filters, fetch_page, field_map, lifecycle, required, ListSpec, PageRequest};
use crate::state::AppState;
use crate::store::{Document, DocumentStore, NewDocument};
use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const DELIVERY_NOTES: ListSpec = ListSpec::new(
    "Delivery Note",
    &["name", "posting_date", "customer", "company", "status", "grand_total", "currency", "docstatus", "modified"],
)
.search(&["name", "customer", "company", "status"]);

const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DeliveryNoteFields {
    #[serde(rename(deserialize = "date", serialize = "posting_date"), alias = "posting_date")]
    pub posting_date: Option<String>,
    pub posting_time: Option<String>,
    pub company: Option<String>,
    pub customer: Option<String>,
    pub currency: Option<String>,
    #[serde(rename(deserialize = "price_list", serialize = "selling_price_list"), alias = "selling_price_list")]
    pub selling_price_list: Option<String>,
    #[serde(
        default,
        rename(deserialize = "exchange_rate", serialize = "conversion_rate"),
        alias = "conversion_rate",
        deserialize_with = "lenient::opt_f64"
    )]
    pub conversion_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub is_return: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub ignore_pricing_rule: Option<i64>,
    pub cost_center: Option<String>,
    pub project: Option<String>,
    #[serde(rename(deserialize = "set_source_warehouse", serialize = "set_warehouse"), alias = "set_warehouse")]
    pub set_warehouse: Option<String>,
    pub tax_category: Option<String>,
    pub shipping_rule: Option<String>,
    pub incoterm: Option<String>,
    #[serde(
        rename(deserialize = "sales_taxes_and_charges_template", serialize = "taxes_and_charges"),
        alias = "taxes_and_charges"
    )]
    pub taxes_and_charges: Option<String>,
    #[serde(
        rename(deserialize = "apply_additional_discount_on", serialize = "apply_discount_on"),
        alias = "apply_discount_on"
    )]
    pub apply_discount_on: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub additional_discount_percentage: Option<f64>,
    #[serde(
        default,
        rename(deserialize = "additional_discount_amount", serialize = "discount_amount"),
        alias = "discount_amount",
        deserialize_with = "lenient::opt_f64"
    )]
    pub discount_amount: Option<f64>,
    #[serde(rename(deserialize = "billing_address_name", serialize = "billing_address"), alias = "billing_address")]
    pub billing_address: Option<String>,
    #[serde(
        rename(deserialize = "shipping_address", serialize = "shipping_address_name"),
        alias = "shipping_address_name"
    )]
    pub shipping_address_name: Option<String>,
    pub dispatch_address_name: Option<String>,
    #[serde(rename(deserialize = "company_address_name", serialize = "company_address"), alias = "company_address")]
    pub company_address: Option<String>,
    pub contact_person: Option<String>,
    pub place_of_supply: Option<String>,
    pub transporter: Option<String>,
    pub mode_of_transport: Option<String>,
    pub gst_transporter_id: Option<String>,
    pub driver: Option<String>,
    pub driver_name: Option<String>,
    pub vehicle_no: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub distance: Option<f64>,
    #[serde(rename(deserialize = "transport_receipt_no", serialize = "lr_no"), alias = "lr_no")]
    pub lr_no: Option<String>,
    #[serde(rename(deserialize = "transport_receipt_date", serialize = "lr_date"), alias = "lr_date")]
    pub lr_date: Option<String>,
    pub sales_partner: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub commission_rate: Option<f64>,
    pub terms: Option<String>,
    pub letter_head: Option<String>,
    pub print_heading: Option<String>,
    pub print_language: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub group_same_items: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub print_without_amount: Option<i64>,
    pub source: Option<String>,
    pub campaign: Option<String>,
    pub territory: Option<String>,
    pub instructions: Option<String>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub items: Option<Vec<ItemRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub taxes: Option<Vec<TaxRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub sales_team: Option<Vec<SalesTeamRow>>,
}

/// Posting date and time default to now.
pub async fn create_delivery_note(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<DeliveryNoteFields>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now().naive_utc();
    let mut fields = field_map(&input)?;
    put_table(&mut fields, "items", &input.items)?;
    put_table(&mut fields, "taxes", &input.taxes)?;
    put_table(&mut fields, "sales_team", &input.sales_team)?;
    fields.entry("posting_date").or_insert(json!(now.date().to_string()));
    fields.entry("posting_time").or_insert(json!(now.format(TIME_FORMAT).to_string()));
    for (flag, default) in [
        ("conversion_rate", json!(1.0)),
        ("is_return", json!(0)),
        ("ignore_pricing_rule", json!(0)),
        ("group_same_items", json!(0)),
        ("print_without_amount", json!(0)),
    ] {
        fields.entry(flag).or_insert(default);
    }
    apply_totals("Delivery Note", &mut fields);
    let note = state
        .store
        .insert(NewDocument::new("Delivery Note", &ctx.user, fields))
        .await
        .log_failure("create delivery note")?;
    Ok(created_flat(
        json!({ "delivery_note": note.name }),
        "Delivery Note Created Successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryNoteListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    pub status: Option<String>,
    pub customer: Option<String>,
    pub company: Option<String>,
}

pub async fn list_delivery_notes(
    State(state): State<AppState>,
    Payload(params): Payload<DeliveryNoteListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = eq_filters(&[
        ("status", params.status.as_deref()),
        ("customer", params.customer.as_deref()),
        ("company", params.company.as_deref()),
    ]);
    let page = fetch_page(state.store(), &DELIVERY_NOTES, &params.page, filters).await?;
    Ok(page.transactional(page.rows(DELIVERY_NOTES.fields), "Delivery Notes fetched successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryNoteRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
}

fn missing(name: &str) -> impl FnOnce(StoreError) -> AppError {
    not_found_as(format!("Delivery Note {} does not exist", name))
}

async fn load(store: &dyn DocumentStore, input: &DeliveryNoteRef) -> Result<Document, AppError> {
    let name = required(&input.name, "Delivery Note name")?;
    store.get("Delivery Note", name).await.map_err(missing(name))
}

pub async fn delete_delivery_note(
    State(state): State<AppState>,
    Payload(input): Payload<DeliveryNoteRef>,
) -> Result<impl IntoResponse, AppError> {
    let note = load(state.store(), &input).await?;
    lifecycle::require_draft(&note, "deleted")?;
    state
        .store
        .delete("Delivery Note", &note.name)
        .await
        .log_failure("delete delivery note")?;
    Ok(success_flat(
        json!({ "delivery_note": note.name }),
        "Delivery Note deleted successfully",
    ))
}

pub async fn submit_delivery_note(
    State(state): State<AppState>,
    Payload(input): Payload<DeliveryNoteRef>,
) -> Result<impl IntoResponse, AppError> {
    let note = load(state.store(), &input).await?;
    let note = lifecycle::submit(state.store(), &note)
        .await
        .log_failure("submit delivery note")?;
    Ok(success_flat(
        json!({ "delivery_note": note.name, "docstatus": note.docstatus.as_i64(), "delivery_status": note.value("status") }),
        "Delivery Note submitted successfully",
    ))
}

pub async fn cancel_delivery_note(
    State(state): State<AppState>,
    Payload(input): Payload<DeliveryNoteRef>,
) -> Result<impl IntoResponse, AppError> {
    let note = load(state.store(), &input).await?;
    let note = lifecycle::cancel(state.store(), &note)
        .await
        .log_failure("cancel delivery note")?;
    Ok(success_flat(
        json!({ "delivery_note": note.name, "docstatus": note.docstatus.as_i64(), "delivery_status": note.value("status") }),
        "Delivery Note cancelled successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDeliveryNote {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    pub company: Option<String>,
    pub selling_price_list: Option<String>,
    pub customer: Option<String>,
    pub posting_date: Option<String>,
    pub posting_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub conversion_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub additional_discount_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient::json_list")]
    pub items: Option<Vec<ItemRow>>,
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Fails unless the warehouse exists and carries an `account`.
async fn check_warehouse_account(store: &dyn DocumentStore, warehouse: &str, company: &str) -> Result<(), AppError> {
    let account = match store.get("Warehouse", warehouse).await {
        Ok(w) => w.str_field("account").filter(|a| !a.is_empty()).map(str::to_string),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    if account.is_none() {
        return Err(AppError::Validation(format!(
            "Warehouse '{}' has no account mapped for company '{}'",
            warehouse, company
        )));
    }
    Ok(())
}

/// Rebuilds the item table from the Item master.
async fn item_rows(store: &dyn DocumentStore, rows: &[ItemRow], company: &str) -> Result<Vec<Value>, AppError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let code = non_blank(&row.item_code).ok_or_else(|| AppError::required("item_code"))?;
        let warehouse = non_blank(&row.warehouse)
            .ok_or_else(|| AppError::Validation(format!("Warehouse is mandatory for item {}", code)))?;
        check_warehouse_account(store, warehouse, company).await?;
        let item = store
            .get("Item", code)
            .await
            .map_err(not_found_as(format!("Item {} not found", code)))?;
        out.push(json!({
            "item_code": item.name,
            "item_name": item.value("item_name"),
            "description": item.value("description"),
            "qty": row.qty.unwrap_or(1.0),
            "rate": row.rate.unwrap_or(0.0),
            "uom": item.value("stock_uom"),
            "stock_uom": item.value("stock_uom"),
            "conversion_factor": 1,
            "warehouse": warehouse,
        }));
    }
    Ok(out)
}

/// Draft only. Company, selling price list with a currency, and fully specified items are mandatory.
pub async fn update_delivery_note(
    State(state): State<AppState>,
    Payload(input): Payload<UpdateDeliveryNote>,
) -> Result<impl IntoResponse, AppError> {
    let mut note = load(state.store(), &DeliveryNoteRef { name: input.name.clone() }).await?;
    lifecycle::require_draft(&note, "updated")?;

    let company = non_blank(&input.company)
        .or_else(|| note.str_field("company").filter(|c| !c.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("Company is mandatory".into()))?;
    let price_list = non_blank(&input.selling_price_list)
        .ok_or_else(|| AppError::Validation("selling_price_list is mandatory".into()))?;
    let currency = match state.store.get("Price List", price_list).await {
        Ok(list) => list.str_field("currency").filter(|c| !c.is_empty()).map(str::to_string),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    }
    .ok_or_else(|| AppError::Validation("Price List currency not found".into()))?;

    let rows = input.items.as_deref().filter(|r| !r.is_empty()).ok_or_else(|| AppError::Validation("Items are required".into()))?;
    let items = item_rows(state.store(), rows, &company).await.log_failure("update delivery note")?;

    let now = Utc::now().naive_utc();
    let mut changes = Map::new();
    changes.insert("company".into(), json!(company));
    changes.insert("selling_price_list".into(), json!(price_list));
    changes.insert("price_list_currency".into(), json!(currency));
    if let Some(customer) = &input.customer {
        changes.insert("customer".into(), json!(customer));
    }
    changes.insert(
        "posting_date".into(),
        json!(non_blank(&input.posting_date).map(str::to_string).unwrap_or_else(|| now.date().to_string())),
    );
    changes.insert(
        "posting_time".into(),
        json!(non_blank(&input.posting_time)
            .map(str::to_string)
            .unwrap_or_else(|| now.format(TIME_FORMAT).to_string())),
    );
    changes.insert("conversion_rate".into(), json!(input.conversion_rate.filter(|r| *r != 0.0).unwrap_or(1.0)));
    changes.insert("items".into(), Value::Array(items));
    changes.insert(
        "additional_discount_percentage".into(),
        json!(input.additional_discount_percentage.unwrap_or(0.0)),
    );
    note.fields.extend(changes);
    note.fields.entry("taxes").or_insert_with(|| json!([]));

    apply_totals("Delivery Note", &mut note.fields);
    let note = state.store.save(&note).await.log_failure("update delivery note")?;
    Ok(success_flat(
        json!({ "delivery_note": note.name }),
        "Delivery Note updated successfully",
    ))
}
