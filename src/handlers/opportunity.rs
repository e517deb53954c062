//! Opportunity endpoints.

use crate::error::{not_found_as, AppError, LogFailure};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::{created_flat, success, success_flat};
use crate::service::{apply_totals, eq_filters, fetch_page, field_map, mapper, ListSpec, PageRequest, RequestValidator};
use crate::state::AppState;
use crate::store::{Filter, NewDocument};
use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const OPPORTUNITIES: ListSpec = ListSpec::new(
    "Opportunity",
    &[
        "name", "party_name", "status", "source", "opportunity_from", "company", "transaction_date",
        "opportunity_amount", "sales_stage", "modified",
    ],
)
.search(&["party_name", "contact_email", "contact_mobile", "source", "company"]);

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OpportunityItem {
    pub item_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OpportunityFields {
    pub opportunity_type: Option<String>,
    pub sales_stage: Option<String>,
    pub opportunity_from: Option<String>,
    pub party_name: Option<String>,
    pub source: Option<String>,
    pub expected_closing_date: Option<String>,
    pub opportunity_owner: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub probability: Option<f64>,
    pub status: Option<String>,
    pub company: Option<String>,
    #[serde(rename(deserialize = "opportunity_date", serialize = "transaction_date"), alias = "transaction_date")]
    pub transaction_date: Option<String>,
    pub campaign: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub no_of_employees: Option<String>,
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub annual_revenue: Option<f64>,
    pub market_segment: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub territory: Option<String>,
    pub website: Option<String>,
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub exchange_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub opportunity_amount: Option<f64>,
    pub job_title: Option<String>,
    pub contact_email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub contact_mobile: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub whatsapp: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub phone_ext: Option<String>,
    #[serde(default, deserialize_with = "lenient::json_list")]
    pub items: Option<Vec<OpportunityItem>>,
}

pub async fn create_opportunity(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<OpportunityFields>,
) -> Result<impl IntoResponse, AppError> {
    RequestValidator::require(&[
        ("opportunity_from", input.opportunity_from.as_deref()),
        ("party_name", input.party_name.as_deref()),
        ("status", input.status.as_deref()),
        ("company", input.company.as_deref()),
        ("opportunity_date", input.transaction_date.as_deref()),
    ])?;
    let mut fields = field_map(&input)?;
    apply_totals("Opportunity", &mut fields);
    let opp = state
        .store
        .insert(NewDocument::new("Opportunity", &ctx.user, fields))
        .await
        .log_failure("create opportunity")?;
    Ok(created_flat(
        json!({ "opportunity_id": opp.name }),
        "Opportunity created successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct OpportunityListParams {
    #[serde(flatten)]
    pub page: PageRequest,
    pub status: Option<String>,
    pub source: Option<String>,
    pub opportunity_from: Option<String>,
    pub company: Option<String>,
}

pub async fn list_opportunity(
    State(state): State<AppState>,
    Payload(params): Payload<OpportunityListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = eq_filters(&[
        ("status", params.status.as_deref()),
        ("source", params.source.as_deref()),
        ("opportunity_from", params.opportunity_from.as_deref()),
        ("company", params.company.as_deref()),
    ]);
    let page = fetch_page(state.store(), &OPPORTUNITIES, &params.page, filters).await?;
    Ok(page.transactional(page.rows(OPPORTUNITIES.fields), "Opportunities fetched successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct OpportunityRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub opportunity_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
}

impl OpportunityRef {
    fn id(&self) -> Result<&str, AppError> {
        [&self.opportunity_id, &self.name]
            .into_iter()
            .filter_map(|v| v.as_deref().map(str::trim))
            .find(|s| !s.is_empty())
            .ok_or_else(|| AppError::required("opportunity_id"))
    }
}

fn missing(id: &str) -> impl FnOnce(crate::error::StoreError) -> AppError {
    not_found_as(format!("Opportunity '{}' does not exist", id))
}

pub async fn get_opportunity_by_id(
    State(state): State<AppState>,
    Payload(input): Payload<OpportunityRef>,
) -> Result<impl IntoResponse, AppError> {
    let id = input.id()?;
    let opp = state.store.get("Opportunity", id).await.map_err(missing(id))?;
    Ok(success(opp.to_value(), "Opportunity fetched successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOpportunity {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub opportunity_id: Option<String>,
    /// Company name for a Lead created from `party_name`.
    pub organization_name: Option<String>,
    #[serde(flatten)]
    pub fields: OpportunityFields,
}

fn split_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Resolves `party_name` against the opportunity's party type.
/// Leads are matched by `contact_email` and created when missing; Customers must already exist.
async fn link_party(
    state: &AppState,
    ctx: &RequestContext,
    input: &UpdateOpportunity,
    opportunity_from: Option<&str>,
    party_name: &str,
    changes: &mut Map<String, Value>,
) -> Result<(), AppError> {
    match opportunity_from {
        Some("Lead") => {
            let email = input.fields.contact_email.as_deref().filter(|e| !e.is_empty());
            let existing = match email {
                Some(email) => state.store.find_one("Lead", vec![Filter::eq("email_id", email)]).await?,
                None => None,
            };
            let lead_name = match existing {
                Some(lead) => lead.name,
                None => {
                    let (first, last) = split_name(party_name);
                    let mut lead = Map::new();
                    lead.insert("first_name".into(), json!(first));
                    lead.insert("last_name".into(), json!(last));
                    lead.insert("status".into(), json!("Lead"));
                    for (key, value) in [
                        ("email_id", email),
                        ("mobile_no", input.fields.contact_mobile.as_deref()),
                        ("company_name", input.organization_name.as_deref()),
                    ] {
                        if let Some(v) = value {
                            lead.insert(key.into(), json!(v));
                        }
                    }
                    let lead = state.store.insert(NewDocument::new("Lead", &ctx.user, lead)).await?;
                    tracing::info!(lead = %lead.name, "lead created for opportunity party");
                    lead.name
                }
            };
            changes.insert("party_name".into(), json!(lead_name));
            changes.insert("customer_name".into(), json!(party_name));
        }
        Some("Customer") => {
            if !state.store.exists("Customer", party_name).await? {
                return Err(AppError::NotFound(format!("Customer '{}' does not exist", party_name)));
            }
            changes.insert("party_name".into(), json!(party_name));
            changes.insert("customer_name".into(), json!(party_name));
        }
        _ => {}
    }
    Ok(())
}

pub async fn update_opportunity(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<UpdateOpportunity>,
) -> Result<impl IntoResponse, AppError> {
    let id = input
        .opportunity_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::required("opportunity_id"))?;
    let mut opp = state.store.get("Opportunity", id).await.map_err(missing(id))?;

    let mut changes = field_map(&input.fields)?;
    changes.remove("party_name");
    let opportunity_from = input
        .fields
        .opportunity_from
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| opp.str_field("opportunity_from").map(str::to_string));
    if let Some(party) = input.fields.party_name.as_deref().filter(|s| !s.trim().is_empty()) {
        link_party(&state, &ctx, &input, opportunity_from.as_deref(), party, &mut changes)
            .await
            .log_failure("update opportunity")?;
    }

    opp.fields.extend(changes);
    apply_totals("Opportunity", &mut opp.fields);
    let opp = state.store.save(&opp).await.log_failure("update opportunity")?;
    Ok(success_flat(json!({ "opportunity_id": opp.name }), "Opportunity updated successfully"))
}

pub async fn delete_opportunity(
    State(state): State<AppState>,
    Payload(input): Payload<OpportunityRef>,
) -> Result<impl IntoResponse, AppError> {
    let id = input.id()?;
    state
        .store
        .delete("Opportunity", id)
        .await
        .map_err(missing(id))
        .log_failure("delete opportunity")?;
    Ok(success_flat(json!({ "opportunity_id": id }), "Opportunity deleted successfully"))
}

/// Draft Quotation for the opportunity's party and items; the opportunity moves to status `Quotation`.
pub async fn convert_opportunity_to_quotation(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<OpportunityRef>,
) -> Result<impl IntoResponse, AppError> {
    let id = input.id()?;
    let opp = state.store.get("Opportunity", id).await.map_err(missing(id))?;
    let mut fields = mapper::opportunity_to_quotation(&opp, Utc::now().date_naive());
    apply_totals("Quotation", &mut fields);
    let quotation = state
        .store
        .insert(NewDocument::new("Quotation", &ctx.user, fields))
        .await
        .log_failure("opportunity conversion")?;
    state
        .store
        .set_value("Opportunity", &opp.name, "status", json!("Quotation"), true)
        .await
        .log_failure("opportunity conversion")?;
    Ok(created_flat(
        json!({ "quotation": quotation.name, "opportunity_id": opp.name }),
        "Quotation created from Opportunity",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_split_on_first_space() {
        assert_eq!(split_name("Ada King Lovelace"), ("Ada".into(), "King Lovelace".into()));
        assert_eq!(split_name("Ada"), ("Ada".into(), String::new()));
    }

    #[test]
    fn opportunity_date_is_stored_as_transaction_date() {
        let input: OpportunityFields = serde_json::from_value(json!({
            "opportunity_date": "2025-03-14",
            "items": "[{\"item_code\": \"PEN\", \"qty\": \"2\", \"rate\": 5}]"
        }))
        .unwrap();
        let fields = field_map(&input).unwrap();
        assert_eq!(fields["transaction_date"], "2025-03-14");
        assert_eq!(fields["items"][0]["qty"], json!(2.0));
        assert!(!fields.contains_key("opportunity_date"));
    }
}
