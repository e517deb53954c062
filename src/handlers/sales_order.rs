//! Sales Order endpoints, plus Delivery Note and Sales Invoice creation from an order.

use super::selling::{put_table, ItemRow, PaymentRow, SalesTeamRow, TaxRow};
use crate::error::{not_found_as, AppError, LogFailure, StoreError};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::{created_flat, success, success_flat};
use crate::service::{apply_totals, eq_filters, fetch_page, field_map, lifecycle, mapper, required, ListSpec, PageRequest, RequestValidator};
use crate::state::AppState;
use crate::store::NewDocument;
use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const SALES_ORDERS: ListSpec = ListSpec::new(
    "Sales Order",
    &[
        "name", "transaction_date", "delivery_date", "customer", "company", "status", "grand_total", "currency",
        "docstatus", "modified",
    ],
)
.search(&["name", "customer", "company", "status"]);

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SalesOrderFields {
    pub customer: Option<String>,
    #[serde(rename(deserialize = "date", serialize = "transaction_date"), alias = "transaction_date")]
    pub transaction_date: Option<String>,
    pub delivery_date: Option<String>,
    pub company: Option<String>,
    pub order_type: Option<String>,
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
    pub customer_purchase_order: Option<String>,
    pub cost_center: Option<String>,
    pub project: Option<String>,
    pub set_warehouse: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub ignore_pricing_rule: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub additional_discount_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub discount_amount: Option<f64>,
    pub source: Option<String>,
    pub campaign: Option<String>,
    pub territory: Option<String>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub items: Option<Vec<ItemRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub taxes: Option<Vec<TaxRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub payment_schedule: Option<Vec<PaymentRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub sales_team: Option<Vec<SalesTeamRow>>,
}

impl SalesOrderFields {
    fn to_fields(&self) -> Result<Map<String, Value>, AppError> {
        let mut fields = field_map(self)?;
        put_table(&mut fields, "items", &self.items)?;
        put_table(&mut fields, "taxes", &self.taxes)?;
        put_table(&mut fields, "payment_schedule", &self.payment_schedule)?;
        put_table(&mut fields, "sales_team", &self.sales_team)?;
        Ok(fields)
    }
}

pub async fn create_sales_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<SalesOrderFields>,
) -> Result<impl IntoResponse, AppError> {
    RequestValidator::require(&[("customer", input.customer.as_deref())])?;
    let mut fields = input.to_fields()?;
    fields.entry("conversion_rate").or_insert(json!(1.0));
    fields.entry("ignore_pricing_rule").or_insert(json!(0));
    apply_totals("Sales Order", &mut fields);
    let order = state
        .store
        .insert(NewDocument::new("Sales Order", &ctx.user, fields))
        .await
        .log_failure("create sales order")?;
    Ok(created_flat(json!({ "sales_order": order.name }), "Sales Order created"))
}

/// The header fields an order accepts after creation.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SalesOrderChanges {
    pub customer: Option<String>,
    pub delivery_date: Option<String>,
    pub order_type: Option<String>,
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
    pub cost_center: Option<String>,
    pub project: Option<String>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub items: Option<Vec<ItemRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub taxes: Option<Vec<TaxRow>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSalesOrder {
    pub name: Option<String>,
    #[serde(flatten)]
    pub changes: SalesOrderChanges,
}

pub async fn update_sales_order(
    State(state): State<AppState>,
    Payload(input): Payload<UpdateSalesOrder>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Sales Order name")?;
    let mut order = state.store.get("Sales Order", name).await.map_err(missing(name))?;
    lifecycle::require_draft(&order, "updated")?;
    let mut changes = field_map(&input.changes)?;
    put_table(&mut changes, "items", &input.changes.items)?;
    put_table(&mut changes, "taxes", &input.changes.taxes)?;
    order.fields.extend(changes);
    apply_totals("Sales Order", &mut order.fields);
    let order = state.store.save(&order).await.log_failure("update sales order")?;
    Ok(success_flat(json!({ "sales_order": order.name }), "Sales Order updated"))
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesOrderListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    pub status: Option<String>,
    pub customer: Option<String>,
    pub company: Option<String>,
}

pub async fn list_sales_orders(
    State(state): State<AppState>,
    Payload(params): Payload<SalesOrderListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = eq_filters(&[
        ("status", params.status.as_deref()),
        ("customer", params.customer.as_deref()),
        ("company", params.company.as_deref()),
    ]);
    let page = fetch_page(state.store(), &SALES_ORDERS, &params.page, filters).await?;
    Ok(page.transactional(page.rows(SALES_ORDERS.fields), "Sales Orders fetched successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesOrderRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub sales_order: Option<String>,
}

impl SalesOrderRef {
    fn id(&self) -> Result<&str, AppError> {
        [&self.name, &self.sales_order]
            .into_iter()
            .filter_map(|v| v.as_deref().map(str::trim))
            .find(|s| !s.is_empty())
            .ok_or_else(|| AppError::required("Sales Order name"))
    }
}

fn missing(name: &str) -> impl FnOnce(StoreError) -> AppError {
    not_found_as(format!("Sales Order {} does not exist", name))
}

/// Submitted orders are cancelled before the delete.
pub async fn delete_sales_order(
    State(state): State<AppState>,
    Payload(input): Payload<SalesOrderRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let order = state.store.get("Sales Order", name).await.map_err(missing(name))?;
    lifecycle::cancel_and_delete(state.store(), &order)
        .await
        .log_failure("delete sales order")?;
    Ok(success_flat(
        json!({ "sales_order": name }),
        &format!("Sales Order {} deleted successfully", name),
    ))
}

pub async fn submit_sales_order(
    State(state): State<AppState>,
    Payload(input): Payload<SalesOrderRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let order = state.store.get("Sales Order", name).await.map_err(missing(name))?;
    let order = lifecycle::submit(state.store(), &order)
        .await
        .log_failure("submit sales order")?;
    Ok(success_flat(
        json!({
            "sales_order": order.name,
            "docstatus": order.docstatus.as_i64(),
            "order_status": order.value("status"),
        }),
        "Sales Order submitted",
    ))
}

pub async fn cancel_sales_order(
    State(state): State<AppState>,
    Payload(input): Payload<SalesOrderRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let order = state.store.get("Sales Order", name).await.map_err(missing(name))?;
    let order = lifecycle::cancel(state.store(), &order)
        .await
        .log_failure("cancel sales order")?;
    Ok(success_flat(
        json!({ "sales_order": order.name, "docstatus": order.docstatus.as_i64() }),
        "Sales Order cancelled",
    ))
}

pub async fn get_sales_order_by_id(
    State(state): State<AppState>,
    Payload(input): Payload<SalesOrderRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let order = state.store.get("Sales Order", name).await.map_err(missing(name))?;
    Ok(success(order.to_value(), "Sales Order fetched successfully"))
}

pub async fn make_delivery_note(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<SalesOrderRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let order = state.store.get("Sales Order", name).await.map_err(missing(name))?;
    let mut fields = mapper::sales_order_to_delivery_note(&order, Utc::now().date_naive())?;
    apply_totals("Delivery Note", &mut fields);
    let note = state
        .store
        .insert(NewDocument::new("Delivery Note", &ctx.user, fields))
        .await
        .log_failure("make delivery note")?;
    Ok(created_flat(
        json!({ "delivery_note": note.name, "sales_order": order.name }),
        "Delivery Note created from Sales Order",
    ))
}

pub async fn make_sales_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<SalesOrderRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let order = state.store.get("Sales Order", name).await.map_err(missing(name))?;
    let mut fields = mapper::sales_order_to_sales_invoice(&order, Utc::now().date_naive())?;
    apply_totals("Sales Invoice", &mut fields);
    let invoice = state
        .store
        .insert(NewDocument::new("Sales Invoice", &ctx.user, fields))
        .await
        .log_failure("make sales invoice")?;
    Ok(created_flat(
        json!({ "sales_invoice": invoice.name, "sales_order": order.name }),
        "Sales Invoice created from Sales Order",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_accepts_only_header_fields_and_tables() {
        let input: UpdateSalesOrder = serde_json::from_value(json!({
            "name": "SAL-ORD-2025-00001",
            "price_list": "Wholesale",
            "exchange_rate": 1.5,
            "company": "ignored",
            "items": [{"item_code": "PEN", "qty": 1, "rate": 4}]
        }))
        .unwrap();
        let changes = field_map(&input.changes).unwrap();
        assert_eq!(changes["selling_price_list"], "Wholesale");
        assert_eq!(changes["conversion_rate"], json!(1.5));
        assert!(!changes.contains_key("company"));
        assert!(!changes.contains_key("items"));
        assert_eq!(input.changes.items.as_ref().map(Vec::len), Some(1));
    }
}
