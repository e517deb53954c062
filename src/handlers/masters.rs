//! Read-only master lists: customers, companies, territories and the CRM pick lists.

use crate::error::AppError;
use crate::extractors::{lenient, Payload};
use crate::response::{counted_list, master_list};
use crate::service::{fetch_page, ListSpec, PageRequest};
use crate::state::AppState;
use crate::store::{Filter, ListQuery, SortOrder};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const CUSTOMERS: ListSpec = ListSpec::new("Customer", &["name", "customer_name", "mobile_no", "email_id", "disabled"])
    .search(&["customer_name", "mobile_no", "email_id"])
    .sort(&[], "customer_name", SortOrder::Asc)
    .page_size(20);

const COMPANIES: ListSpec = ListSpec::new(
    "Company",
    &["name", "company_name", "abbr", "default_currency", "country", "is_group", "parent_company"],
)
.search(&["company_name", "abbr", "country"])
.sort(&["company_name", "abbr", "country", "default_currency", "name"], "company_name", SortOrder::Asc)
.page_size(20);

const TERRITORIES: ListSpec = ListSpec::new("Territory", &["name", "parent_territory", "is_group", "lft", "rgt"])
    .search(&["name"])
    .sort(&["name", "parent_territory", "is_group", "lft"], "lft", SortOrder::Asc)
    .page_size(20);

const COUNTRIES: ListSpec = ListSpec::new("Country", &["name", "code", "date_format", "time_format", "time_zones"])
    .search(&["name", "code", "time_zones"])
    .sort(&["name", "code", "date_format", "time_format"], "name", SortOrder::Asc)
    .page_size(20);

const LANGUAGES: ListSpec = ListSpec::new("Language", &["name", "language_name", "language_code", "enabled"])
    .search(&["language_name", "language_code"])
    .sort(&["language_name", "language_code", "name"], "language_name", SortOrder::Asc)
    .page_size(20);

const GENDERS: ListSpec = ListSpec::new("Gender", &["name"])
    .search(&["name"])
    .sort(&["name"], "name", SortOrder::Asc)
    .page_size(20);

const MARKET_SEGMENTS: ListSpec = ListSpec::new("Market Segment", &["name"])
    .search(&["name"])
    .sort(&["name"], "name", SortOrder::Asc)
    .page_size(20);

const CUSTOMER_GROUPS: ListSpec = ListSpec::new("Customer Group", &["name", "parent_customer_group", "is_group"])
    .search(&["name", "parent_customer_group"])
    .sort(&["name", "parent_customer_group", "is_group"], "name", SortOrder::Asc)
    .page_size(20);

const SALES_STAGES: ListSpec = ListSpec::new("Sales Stage", &["name", "idx"])
    .search(&["name"])
    .sort(&["idx", "name"], "idx", SortOrder::Asc)
    .page_size(20);

const CRM_MASTERS: ListSpec = ListSpec::new("CRM Master", &["master", "key", "value", "sorting_order"])
    .search(&["master", "key", "value"])
    .sort(&["master", "key", "value", "sorting_order"], "sorting_order", SortOrder::Asc)
    .page_size(20);

type Reply = (StatusCode, Json<Value>);

async fn paged(state: &AppState, spec: &ListSpec, req: &PageRequest, filters: Vec<Filter>, message: &str) -> Result<Reply, AppError> {
    let page = fetch_page(state.store(), spec, req, filters).await?;
    Ok(page.master(page.rows(spec.fields), message)?)
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    /// `"<field> <asc|desc>"`, used when `sort_by` is absent.
    pub order_by: Option<String>,
    #[serde(default, rename = "cmd")]
    _cmd: Option<Value>,
    /// Any other parameter is an equality filter.
    #[serde(flatten)]
    pub filters: BTreeMap<String, Value>,
}

/// Query values arrive as text; a numeric-looking one also matches the stored number.
fn param_filter(field: &str, value: &Value) -> Filter {
    match value.as_str().map(str::trim).and_then(numeric) {
        Some(number) => Filter::is_in(field, vec![value.clone(), number]),
        None => Filter::eq(field, value.clone()),
    }
}

fn numeric(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

pub async fn list_customers(
    State(state): State<AppState>,
    Payload(mut params): Payload<CustomerListParams>,
) -> Result<impl IntoResponse, AppError> {
    if params.page.sort_by.is_none() {
        if let Some(order_by) = params.order_by.as_deref() {
            let mut parts = order_by.split_whitespace();
            params.page.sort_by = parts.next().map(str::to_string);
            if params.page.sort_order.is_none() {
                params.page.sort_order = parts.next().map(str::to_string);
            }
        }
    }
    let filters = params
        .filters
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(field, value)| param_filter(field, value))
        .collect();
    paged(&state, &CUSTOMERS, &params.page, filters, "Customer List Fetched Successfully").await
}

pub async fn get_company_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    paged(&state, &COMPANIES, &req, Vec::new(), "Company List Fetched Successfully").await
}

pub async fn get_territory_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    paged(&state, &TERRITORIES, &req, Vec::new(), "Territory List Fetched Successfully").await
}

pub async fn get_country_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    paged(&state, &COUNTRIES, &req, Vec::new(), "Country List Fetched Successfully").await
}

/// Enabled languages only.
pub async fn get_language_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let filters = vec![Filter::eq("enabled", 1)];
    paged(&state, &LANGUAGES, &req, filters, "Language List Fetched Successfully").await
}

pub async fn get_gender_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    paged(&state, &GENDERS, &req, Vec::new(), "Gender List Fetched Successfully").await
}

pub async fn get_market_segment_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    paged(&state, &MARKET_SEGMENTS, &req, Vec::new(), "Market Segment List Fetched Successfully").await
}

pub async fn get_crm_master_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    paged(&state, &CRM_MASTERS, &req, Vec::new(), "CRM Master List Fetched Successfully").await
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerGroupParams {
    #[serde(flatten)]
    pub page: PageRequest,
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    pub full: Option<bool>,
}

/// With `full`, every matching group and `pagination: null`.
pub async fn get_customer_groups(
    State(state): State<AppState>,
    Payload(params): Payload<CustomerGroupParams>,
) -> Result<impl IntoResponse, AppError> {
    let message = "Customer Group List Fetched Successfully";
    if !params.full.unwrap_or(false) {
        return paged(&state, &CUSTOMER_GROUPS, &params.page, Vec::new(), message).await;
    }
    let req = PageRequest {
        page: Some(1),
        page_size: Some(0),
        ..params.page
    };
    let page = fetch_page(state.store(), &CUSTOMER_GROUPS, &req, Vec::new()).await?;
    Ok(master_list(page.rows(CUSTOMER_GROUPS.fields), None, message)?)
}

/// Stages as `{id, name}`, in `idx` order by default.
pub async fn get_sales_stage_list(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let page = fetch_page(state.store(), &SALES_STAGES, &req, Vec::new()).await?;
    let rows = page
        .results
        .iter()
        .map(|stage| json!({ "id": stage.name, "name": stage.name }))
        .collect();
    Ok(page.master(rows, "Sales Stages List Fetched Successfully")?)
}

async fn every(state: &AppState, query: ListQuery, fields: &[&str]) -> Result<Vec<Value>, AppError> {
    let docs = state.store.list(&query).await?;
    Ok(docs.iter().map(|d| d.project(fields)).collect())
}

pub async fn get_campaign_list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let fields = ["name", "campaign_name", "owner"];
    let query = ListQuery::new("Campaign").fields(&fields).order_by("creation", SortOrder::Desc);
    Ok(counted_list(every(&state, query, &fields).await?, "Campaign List Fetched Successfully")?)
}

pub async fn get_industry_list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::new("Industry Type").fields(&["name"]).order_by("name", SortOrder::Asc);
    Ok(counted_list(every(&state, query, &["name"]).await?, "Industry List Fetched Successfully")?)
}

/// `{id, name, description}` for dropdowns.
pub async fn get_opportunity_type_list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::new("Opportunity Type")
        .fields(&["name", "description"])
        .order_by("name", SortOrder::Asc);
    let types = state.store.list(&query).await?;
    let rows = types
        .iter()
        .map(|t| {
            json!({
                "id": t.name,
                "name": t.name,
                "description": t.str_field("description").unwrap_or_default(),
            })
        })
        .collect();
    Ok(counted_list(rows, "Opportunity Type List Fetched Successfully")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_customer_params_become_filters() {
        let params: CustomerListParams = serde_json::from_value(json!({
            "page": "2",
            "search": "ac",
            "order_by": "modified desc",
            "cmd": "crm_api.masters.list_customers",
            "customer_group": "Commercial",
            "disabled": "0"
        }))
        .unwrap();
        assert_eq!(params.page.page, Some(2));
        assert_eq!(params.page.search.as_deref(), Some("ac"));
        assert_eq!(params.order_by.as_deref(), Some("modified desc"));
        assert_eq!(params.filters.len(), 2);
        assert_eq!(params.filters["customer_group"], "Commercial");
    }

    #[test]
    fn numeric_text_params_also_match_numbers() {
        assert_eq!(
            param_filter("disabled", &json!("0")),
            Filter::is_in("disabled", vec![json!("0"), json!(0)])
        );
        assert_eq!(
            param_filter("credit_limit", &json!("2.5")),
            Filter::is_in("credit_limit", vec![json!("2.5"), json!(2.5)])
        );
        assert_eq!(param_filter("customer_group", &json!("Commercial")), Filter::eq("customer_group", "Commercial"));
        assert_eq!(param_filter("territory", &json!("NaN")), Filter::eq("territory", "NaN"));
    }
}
