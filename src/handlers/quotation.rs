//! Quotation endpoints.

use super::selling::{ensure_item, ensure_party, project_rows, put_table, ItemRow, PaymentRow, TaxRow};
use crate::error::{not_found_as, AppError, LogFailure, StoreError};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::{created_flat, success, success_flat};
use crate::service::{apply_totals, eq_filters, fetch_page, field_map, lifecycle, mapper, required, ListSpec, PageRequest};
use crate::state::AppState;
use crate::store::NewDocument;
use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const QUOTATIONS: ListSpec = ListSpec::new(
    "Quotation",
    &[
        "name", "transaction_date", "valid_till", "quotation_to", "party_name", "company", "status", "grand_total",
        "currency", "modified",
    ],
)
.search(&["name", "party_name", "company", "status", "quotation_to"]);

const QUOTATION_HEADER: &[&str] = &[
    "name", "transaction_date", "valid_till", "quotation_to", "party_name", "company", "status", "currency",
    "grand_total",
];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct QuotationFields {
    #[serde(rename(deserialize = "series", serialize = "naming_series"), alias = "naming_series")]
    pub naming_series: Option<String>,
    #[serde(rename(deserialize = "date", serialize = "transaction_date"), alias = "transaction_date")]
    pub transaction_date: Option<String>,
    pub valid_till: Option<String>,
    pub order_type: Option<String>,
    pub quotation_to: Option<String>,
    #[serde(rename(deserialize = "customer", serialize = "party_name"), alias = "party_name")]
    pub party_name: Option<String>,
    pub company: Option<String>,
    pub status: Option<String>,
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
    pub ignore_pricing_rule: Option<i64>,
    pub scan_barcode: Option<String>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub items: Option<Vec<ItemRow>>,
    #[serde(
        default,
        rename = "sales_taxes_and_charges",
        alias = "taxes",
        deserialize_with = "lenient::json_list",
        skip_serializing
    )]
    pub taxes: Option<Vec<TaxRow>>,
    #[serde(
        rename(deserialize = "apply_additional_discount_on", serialize = "apply_discount_on"),
        alias = "apply_discount_on"
    )]
    pub apply_discount_on: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub additional_discount_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub additional_discount_amount: Option<f64>,
    pub coupon_code: Option<String>,
    #[serde(rename(deserialize = "lead_address", serialize = "customer_address"), alias = "customer_address")]
    pub customer_address: Option<String>,
    pub contact_person: Option<String>,
    pub place_of_supply: Option<String>,
    #[serde(
        rename(deserialize = "shipping_address", serialize = "shipping_address_name"),
        alias = "shipping_address_name"
    )]
    pub shipping_address_name: Option<String>,
    #[serde(rename(deserialize = "company_address_name", serialize = "company_address"), alias = "company_address")]
    pub company_address: Option<String>,
    pub company_contact_person: Option<String>,
    pub payment_terms_template: Option<String>,
    #[serde(default, deserialize_with = "lenient::json_list", skip_serializing)]
    pub payment_schedule: Option<Vec<PaymentRow>>,
    pub terms: Option<String>,
    #[serde(
        rename(deserialize = "term_details", serialize = "terms_and_conditions"),
        alias = "terms_and_conditions"
    )]
    pub terms_and_conditions: Option<String>,
    pub letter_head: Option<String>,
    pub print_heading: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub group_same_items: Option<i64>,
    pub referral_sales_partner: Option<String>,
    pub supplier_quotation: Option<String>,
    pub territory: Option<String>,
    pub source: Option<String>,
    pub campaign: Option<String>,
}

impl QuotationFields {
    fn to_fields(&self) -> Result<Map<String, Value>, AppError> {
        let mut fields = field_map(self)?;
        put_table(&mut fields, "items", &self.items)?;
        put_table(&mut fields, "taxes", &self.taxes)?;
        put_table(&mut fields, "payment_schedule", &self.payment_schedule)?;
        Ok(fields)
    }
}

pub async fn create_quotation(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<QuotationFields>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(party) = input.party_name.as_deref().filter(|p| !p.trim().is_empty()) {
        ensure_party(state.store(), &ctx.user, input.quotation_to.as_deref(), party)
            .await
            .log_failure("create quotation")?;
    }
    let mut fields = input.to_fields()?;
    fields.entry("status").or_insert(json!("Draft"));
    apply_totals("Quotation", &mut fields);
    let quotation = state
        .store
        .insert(NewDocument::new("Quotation", &ctx.user, fields))
        .await
        .log_failure("create quotation")?;
    Ok(created_flat(
        json!({ "quotation": quotation.name }),
        "Quotation Created Successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuotation {
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: QuotationFields,
}

/// Draft only. Unknown item codes become Items; sent tables replace the stored ones.
pub async fn update_quotation(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<UpdateQuotation>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Quotation name")?;
    let mut quotation = state
        .store
        .get("Quotation", name)
        .await
        .map_err(not_found_as(format!("Quotation {} does not exist", name)))?;
    lifecycle::require_draft(&quotation, "updated")?;

    let quotation_to = input
        .fields
        .quotation_to
        .clone()
        .or_else(|| quotation.str_field("quotation_to").map(str::to_string));
    let party = input
        .fields
        .party_name
        .clone()
        .or_else(|| quotation.str_field("party_name").map(str::to_string));
    if let Some(party) = party.as_deref().filter(|p| !p.trim().is_empty()) {
        ensure_party(state.store(), &ctx.user, quotation_to.as_deref(), party)
            .await
            .log_failure("update quotation")?;
    }
    for code in input.fields.items.iter().flatten().filter_map(|i| i.item_code.as_deref()) {
        ensure_item(state.store(), &ctx.user, code)
            .await
            .log_failure("update quotation")?;
    }

    quotation.fields.extend(input.fields.to_fields()?);
    apply_totals("Quotation", &mut quotation.fields);
    let quotation = state.store.save(&quotation).await.log_failure("update quotation")?;
    Ok(success_flat(
        json!({ "quotation": quotation.name }),
        "Quotation Updated Successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotationRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub quotation_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    pub delivery_date: Option<String>,
}

impl QuotationRef {
    fn id(&self) -> Result<&str, AppError> {
        [&self.quotation_name, &self.name]
            .into_iter()
            .filter_map(|v| v.as_deref().map(str::trim))
            .find(|s| !s.is_empty())
            .ok_or_else(|| AppError::required("Quotation name"))
    }
}

fn missing(name: &str) -> impl FnOnce(StoreError) -> AppError {
    not_found_as(format!("Quotation {} does not exist", name))
}

pub async fn submit_quotation(
    State(state): State<AppState>,
    Payload(input): Payload<QuotationRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let quotation = state.store.get("Quotation", name).await.map_err(missing(name))?;
    let quotation = lifecycle::submit(state.store(), &quotation)
        .await
        .log_failure("submit quotation")?;
    Ok(success_flat(
        json!({
            "quotation": quotation.name,
            "docstatus": quotation.docstatus.as_i64(),
            "quotation_status": quotation.value("status"),
        }),
        "Quotation Submitted Successfully",
    ))
}

pub async fn cancel_quotation(
    State(state): State<AppState>,
    Payload(input): Payload<QuotationRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let quotation = state.store.get("Quotation", name).await.map_err(missing(name))?;
    let quotation = lifecycle::cancel(state.store(), &quotation)
        .await
        .log_failure("cancel quotation")?;
    Ok(success_flat(
        json!({
            "quotation": quotation.name,
            "docstatus": quotation.docstatus.as_i64(),
            "quotation_status": quotation.value("status"),
        }),
        "Quotation Cancelled Successfully",
    ))
}

pub async fn delete_quotation(
    State(state): State<AppState>,
    Payload(input): Payload<QuotationRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let quotation = state
        .store
        .get("Quotation", name)
        .await
        .map_err(not_found_as("Quotation not found"))?;
    lifecycle::require_draft(&quotation, "deleted")?;
    state
        .store
        .delete("Quotation", name)
        .await
        .log_failure("delete quotation")?;
    Ok(success_flat(json!({ "quotation": name }), "Quotation Deleted Successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotationListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    pub status: Option<String>,
    pub quotation_to: Option<String>,
    pub company: Option<String>,
    pub customer: Option<String>,
}

pub async fn list_quotation(
    State(state): State<AppState>,
    Payload(params): Payload<QuotationListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = eq_filters(&[
        ("status", params.status.as_deref()),
        ("quotation_to", params.quotation_to.as_deref()),
        ("company", params.company.as_deref()),
        ("party_name", params.customer.as_deref()),
    ]);
    let page = fetch_page(state.store(), &QUOTATIONS, &params.page, filters).await?;
    Ok(page.transactional(page.rows(QUOTATIONS.fields), "Quotations fetched successfully"))
}

pub async fn get_quotation_by_id(
    State(state): State<AppState>,
    Payload(input): Payload<QuotationRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let quotation = state.store.get("Quotation", name).await.map_err(missing(name))?;
    let mut data = match quotation.project(QUOTATION_HEADER) {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    data.insert(
        "items".into(),
        project_rows(&quotation, "items", &[("item_code", "item_code"), ("qty", "qty"), ("rate", "rate"), ("amount", "amount")]),
    );
    data.insert(
        "taxes".into(),
        project_rows(
            &quotation,
            "taxes",
            &[("charge_type", "charge_type"), ("account_head", "account_head"), ("rate", "rate"), ("tax_amount", "tax_amount")],
        ),
    );
    data.insert(
        "payment_schedule".into(),
        project_rows(
            &quotation,
            "payment_schedule",
            &[("payment_term", "payment_term"), ("due_date", "due_date"), ("expected_amount", "payment_amount")],
        ),
    );
    Ok(success(Value::Object(data), "Quotation fetched successfully"))
}

/// Sales Order from a Submitted Customer quotation. The quotation is marked `Ordered`.
pub async fn make_sales_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<QuotationRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.id()?;
    let quotation = state.store.get("Quotation", name).await.map_err(missing(name))?;
    let mut fields =
        mapper::quotation_to_sales_order(&quotation, Utc::now().date_naive(), input.delivery_date.as_deref())?;
    apply_totals("Sales Order", &mut fields);
    let order = state
        .store
        .insert(NewDocument::new("Sales Order", &ctx.user, fields))
        .await
        .log_failure("make sales order")?;
    state
        .store
        .set_value("Quotation", &quotation.name, "status", json!("Ordered"), true)
        .await
        .log_failure("make sales order")?;
    Ok(created_flat(
        json!({ "sales_order": order.name, "quotation": quotation.name }),
        "Sales Order created from Quotation",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_names_map_to_stored_fields() {
        let input: QuotationFields = serde_json::from_value(json!({
            "series": "SAL-QTN-.YYYY.-",
            "date": "2025-01-02",
            "customer": "Acme",
            "price_list": "Standard Selling",
            "exchange_rate": "1",
            "items": [{"item_code": "PEN", "quantity": 3, "rate": 10}],
            "sales_taxes_and_charges": [{"type": "On Net Total", "account_head": "VAT", "tax_rate": 5}],
            "term_details": "Net 30"
        }))
        .unwrap();
        let fields = input.to_fields().unwrap();
        assert_eq!(fields["naming_series"], "SAL-QTN-.YYYY.-");
        assert_eq!(fields["transaction_date"], "2025-01-02");
        assert_eq!(fields["party_name"], "Acme");
        assert_eq!(fields["selling_price_list"], "Standard Selling");
        assert_eq!(fields["conversion_rate"], json!(1.0));
        assert_eq!(fields["items"][0]["qty"], json!(3.0));
        assert_eq!(fields["taxes"][0]["charge_type"], "On Net Total");
        assert_eq!(fields["taxes"][0]["rate"], json!(5.0));
        assert_eq!(fields["terms_and_conditions"], "Net 30");
        assert!(!fields.contains_key("payment_schedule"));
    }
}
