//! Sales Invoice endpoints.

use super::selling::{project_rows, put_table, ItemRow, PaymentRow, SalesTeamRow, TaxRow};
use crate::error::{not_found_as, AppError, LogFailure, StoreError};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::{created_flat, success, success_flat};
use crate::service::{apply_totals, eq_filters, fetch_page, field_map, lifecycle, required, ListSpec, PageRequest};
use crate::state::AppState;
use crate::store::{DocStatus, Filter, NewDocument};
use axum::{extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const SALES_INVOICES: ListSpec = ListSpec::new(
    "Sales Invoice",
    &["name", "posting_date", "due_date", "customer", "company", "grand_total", "currency", "docstatus", "modified"],
)
.search(&["name", "customer", "company", "currency"]);

const INVOICE_HEADER: &[&str] = &[
    "name", "posting_date", "due_date", "customer", "company", "currency", "grand_total", "net_total", "status",
    "docstatus",
];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SalesInvoiceFields {
    pub customer: Option<String>,
    pub company: Option<String>,
    #[serde(alias = "date")]
    pub posting_date: Option<String>,
    pub posting_time: Option<String>,
    pub due_date: Option<String>,
    pub currency: Option<String>,
    #[serde(alias = "price_list")]
    pub selling_price_list: Option<String>,
    #[serde(default, alias = "exchange_rate", deserialize_with = "lenient::opt_f64")]
    pub conversion_rate: Option<f64>,
    pub debit_to: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub is_pos: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub is_return: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub update_stock: Option<i64>,
    pub set_warehouse: Option<String>,
    pub cost_center: Option<String>,
    pub project: Option<String>,
    pub po_no: Option<String>,
    pub remarks: Option<String>,
    pub territory: Option<String>,
    pub customer_address: Option<String>,
    pub contact_person: Option<String>,
    pub payment_terms_template: Option<String>,
    pub apply_discount_on: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub additional_discount_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub discount_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub items: Option<Vec<ItemRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub taxes: Option<Vec<TaxRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub payment_schedule: Option<Vec<PaymentRow>>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub sales_team: Option<Vec<SalesTeamRow>>,
    /// Submit right after saving.
    #[serde(default, deserialize_with = "lenient::opt_flag", skip_serializing)]
    pub submit: Option<bool>,
}

impl SalesInvoiceFields {
    fn to_fields(&self) -> Result<Map<String, Value>, AppError> {
        let mut fields = field_map(self)?;
        put_table(&mut fields, "items", &self.items)?;
        put_table(&mut fields, "taxes", &self.taxes)?;
        put_table(&mut fields, "payment_schedule", &self.payment_schedule)?;
        put_table(&mut fields, "sales_team", &self.sales_team)?;
        Ok(fields)
    }

    fn wants_submit(&self) -> bool {
        self.submit.unwrap_or(false)
    }
}

pub async fn create_sales_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<SalesInvoiceFields>,
) -> Result<impl IntoResponse, AppError> {
    let mut fields = input.to_fields()?;
    apply_totals("Sales Invoice", &mut fields);
    let mut invoice = state
        .store
        .insert(NewDocument::new("Sales Invoice", &ctx.user, fields))
        .await
        .log_failure("create sales invoice")?;
    if input.wants_submit() {
        invoice = lifecycle::submit(state.store(), &invoice)
            .await
            .log_failure("submit sales invoice")?;
    }
    Ok(created_flat(
        json!({ "sales_invoice": invoice.name, "docstatus": invoice.docstatus.as_i64() }),
        "Sales Invoice Created Successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesInvoiceListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    /// `Draft`, `Submitted` or `Cancelled`.
    pub status: Option<String>,
    pub customer: Option<String>,
    pub company: Option<String>,
}

pub async fn list_sales_invoices(
    State(state): State<AppState>,
    Payload(params): Payload<SalesInvoiceListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut filters = eq_filters(&[
        ("customer", params.customer.as_deref()),
        ("company", params.company.as_deref()),
    ]);
    if let Some(status) = params.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let docstatus = DocStatus::from_label(status).ok_or_else(|| {
            AppError::Validation(format!(
                "Invalid status '{}': expected Draft, Submitted or Cancelled",
                status
            ))
        })?;
        filters.push(Filter::eq("docstatus", docstatus.as_i64()));
    }
    let page = fetch_page(state.store(), &SALES_INVOICES, &params.page, filters).await?;
    Ok(page.transactional(page.rows(SALES_INVOICES.fields), "Sales Invoices fetched successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSalesInvoice {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: SalesInvoiceFields,
}

fn missing() -> impl FnOnce(StoreError) -> AppError {
    not_found_as("Sales Invoice not found")
}

/// A Submitted invoice is cancelled and amended, the amendment takes the changes and is
/// resubmitted. A Draft is saved in place and submitted when `submit` is set.
pub async fn update_sales_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<UpdateSalesInvoice>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Sales Invoice name")?;
    let mut invoice = state.store.get("Sales Invoice", name).await.map_err(missing())?;

    let was_submitted = invoice.docstatus == DocStatus::Submitted;
    if was_submitted {
        lifecycle::cancel(state.store(), &invoice)
            .await
            .log_failure("update sales invoice")?;
        invoice = state
            .store
            .amend("Sales Invoice", name, &ctx.user)
            .await
            .log_failure("update sales invoice")?;
    }

    invoice.fields.extend(input.fields.to_fields()?);
    apply_totals("Sales Invoice", &mut invoice.fields);
    let mut invoice = state
        .store
        .save(&invoice)
        .await
        .log_failure("update sales invoice")?;
    if was_submitted || input.fields.wants_submit() {
        invoice = lifecycle::submit(state.store(), &invoice)
            .await
            .log_failure("update sales invoice")?;
    }
    Ok(success_flat(
        json!({ "sales_invoice": invoice.name, "docstatus": invoice.docstatus.as_i64() }),
        "sales invoice updated successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesInvoiceRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
}

/// Submitted invoices are cancelled before the delete.
pub async fn delete_sales_invoice(
    State(state): State<AppState>,
    Payload(input): Payload<SalesInvoiceRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Sales Invoice name")?;
    let invoice = state.store.get("Sales Invoice", name).await.map_err(missing())?;
    lifecycle::cancel_and_delete(state.store(), &invoice)
        .await
        .log_failure("delete sales invoice")?;
    Ok(success_flat(
        json!({ "sales_invoice": name }),
        &format!("Sales Invoice {} deleted", name),
    ))
}

pub async fn get_sales_invoice_by_id(
    State(state): State<AppState>,
    Payload(input): Payload<SalesInvoiceRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Sales Invoice name")?;
    let invoice = state.store.get("Sales Invoice", name).await.map_err(missing())?;
    let mut data = match invoice.project(INVOICE_HEADER) {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    data.insert(
        "items".into(),
        project_rows(
            &invoice,
            "items",
            &[
                ("item_code", "item_code"),
                ("item_name", "item_name"),
                ("qty", "qty"),
                ("rate", "rate"),
                ("amount", "amount"),
                ("warehouse", "warehouse"),
            ],
        ),
    );
    Ok(success(Value::Object(data), "Sales Invoice Fetched Successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_and_short_names_are_both_accepted() {
        let input: SalesInvoiceFields = serde_json::from_value(json!({
            "customer": "Acme",
            "date": "2025-02-01",
            "price_list": "Standard Selling",
            "conversion_rate": 1,
            "submit": "1",
            "items": [{"item_code": "PEN", "qty": 2, "rate": 3}]
        }))
        .unwrap();
        assert!(input.wants_submit());
        let fields = input.to_fields().unwrap();
        assert_eq!(fields["posting_date"], "2025-02-01");
        assert_eq!(fields["selling_price_list"], "Standard Selling");
        assert!(!fields.contains_key("submit"));
        assert_eq!(fields["items"][0]["item_code"], "PEN");
    }
}
