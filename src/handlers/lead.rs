//! Lead endpoints: create, list, update, delete, fetch, convert to Opportunity.

use crate::error::{not_found_as, AppError, LogFailure, StoreError};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::{api_response, created_flat, success, success_flat};
use crate::service::{apply_totals, eq_filters, fetch_page, field_map, mapper, required, ListSpec, PageRequest, RequestValidator};
use crate::state::AppState;
use crate::store::NewDocument;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const LEADS: ListSpec = ListSpec::new("Lead", &[]).search(&["first_name", "last_name", "email_id", "mobile_no", "company_name"]);

const LEAD_DETAIL: &[&str] = &[
    "name", "salutation", "first_name", "middle_name", "last_name", "gender", "status", "source", "type",
    "request_type", "email_id", "mobile_no", "phone", "whatsapp_no", "website", "phone_ext", "company_name",
    "annual_revenue", "no_of_employees", "industry", "market_segment", "city", "state", "country", "territory",
    "qualification_status", "qualified_by", "qualified_on", "campaign_name", "company", "disabled", "unsubscribed",
    "blog_subscriber", "creation", "modified",
];

/// Lead fields as callers send them. Input names that differ from the stored ones are renamed here.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LeadFields {
    pub salutation: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "type", alias = "lead_type")]
    pub lead_type: Option<String>,
    pub request_type: Option<String>,
    #[serde(rename(deserialize = "email", serialize = "email_id"), alias = "email_id")]
    pub email_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub mobile_no: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub phone: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        rename(deserialize = "whatsapp", serialize = "whatsapp_no")
    )]
    pub whatsapp_no: Option<String>,
    pub website: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub phone_ext: Option<String>,
    #[serde(rename(deserialize = "organization_name", serialize = "company_name"))]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub annual_revenue: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub no_of_employees: Option<String>,
    pub industry: Option<String>,
    pub market_segment: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub territory: Option<String>,
    pub qualification_status: Option<String>,
    pub qualified_by: Option<String>,
    pub qualified_on: Option<String>,
    pub campaign_name: Option<String>,
    pub company: Option<String>,
    pub print_language: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub disabled: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub unsubscribed: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_check")]
    pub blog_subscriber: Option<i64>,
}

pub async fn create_lead(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<LeadFields>,
) -> Result<impl IntoResponse, AppError> {
    RequestValidator::require(&[
        ("first_name", input.first_name.as_deref()),
        ("status", input.status.as_deref()),
    ])?;
    let mut fields = field_map(&input)?;
    for flag in ["disabled", "unsubscribed", "blog_subscriber"] {
        fields.entry(flag).or_insert(json!(0));
    }
    let lead = state
        .store
        .insert(NewDocument::new("Lead", &ctx.user, fields))
        .await
        .log_failure("create lead")?;
    Ok(api_response(
        json!({ "lead_id": lead.name }),
        "Lead created successfully",
        StatusCode::CREATED,
        false,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    pub status: Option<String>,
    pub source: Option<String>,
}

pub async fn list_leads(
    State(state): State<AppState>,
    Payload(params): Payload<LeadListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = eq_filters(&[("status", params.status.as_deref()), ("source", params.source.as_deref())]);
    let page = fetch_page(state.store(), &LEADS, &params.page, filters).await?;
    Ok(page.transactional(page.rows(LEADS.fields), "Leads fetched successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateLead {
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: LeadFields,
}

/// Overwrites the fields present in the body.
pub async fn update_lead(
    State(state): State<AppState>,
    Payload(input): Payload<UpdateLead>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Lead name")?;
    let mut lead = state.store.get("Lead", name).await?;
    lead.fields.extend(field_map(&input.fields)?);
    let lead = state.store.save(&lead).await.log_failure("update lead")?;
    Ok(success_flat(json!({ "lead_id": lead.name }), "Lead updated successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub lead_name: Option<String>,
}

impl LeadRef {
    fn lead_name(&self) -> Result<&str, AppError> {
        [&self.lead_name, &self.name]
            .into_iter()
            .filter_map(|v| v.as_deref().map(str::trim))
            .find(|s| !s.is_empty())
            .ok_or_else(|| AppError::required("Lead name"))
    }
}

fn missing_lead(name: &str) -> impl FnOnce(StoreError) -> AppError {
    not_found_as(format!("Lead '{}' does not exist", name))
}

pub async fn delete_lead(
    State(state): State<AppState>,
    Payload(input): Payload<LeadRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Lead name")?;
    state.store.delete("Lead", name).await.map_err(missing_lead(name))?;
    Ok(success_flat(json!({ "lead_id": name }), "Lead deleted successfully"))
}

/// `lead_name` from the query, or `name` from the body.
pub async fn get_lead_by_id(
    State(state): State<AppState>,
    Payload(input): Payload<LeadRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.lead_name()?;
    let lead = state.store.get("Lead", name).await.map_err(missing_lead(name))?;
    Ok(success(lead.project(LEAD_DETAIL), "Lead fetched successfully"))
}

pub async fn convert_lead_to_opportunity(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<LeadRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.lead_name, "Lead name")?;
    let lead = state.store.get("Lead", name).await.map_err(missing_lead(name))?;
    let mut fields = mapper::lead_to_opportunity(&lead, Utc::now().date_naive());
    apply_totals("Opportunity", &mut fields);
    let opportunity = state
        .store
        .insert(NewDocument::new("Opportunity", &ctx.user, fields))
        .await
        .log_failure("lead conversion")?;
    state
        .store
        .set_value("Lead", &lead.name, "status", Value::from("Opportunity"), true)
        .await
        .log_failure("lead conversion")?;
    Ok(created_flat(
        json!({ "opportunity_id": opportunity.name }),
        "Lead converted to Opportunity successfully",
    ))
}
