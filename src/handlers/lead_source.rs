//! Lead Source endpoints.

use crate::error::{not_found_as, AppError, LogFailure};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::response::success_flat;
use crate::service::{fetch_page, field_map, required, ListSpec, PageRequest};
use crate::state::AppState;
use crate::store::NewDocument;
use axum::{extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

const LEAD_SOURCES: ListSpec = ListSpec::new("Lead Source", &["name", "details", "modified"]).search(&["name"]);

const LEAD_SOURCE_DETAIL: &[&str] = &["name", "source_name", "details", "modified"];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LeadSourceFields {
    pub source_name: Option<String>,
    pub details: Option<String>,
}

pub async fn create_lead_source(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<LeadSourceFields>,
) -> Result<impl IntoResponse, AppError> {
    required(&input.source_name, "source_name")?;
    let source = state
        .store
        .insert(NewDocument::new("Lead Source", &ctx.user, field_map(&input)?))
        .await
        .log_failure("create lead source")?;
    Ok(success_flat(json!({ "name": source.name }), "Lead Source created successfully"))
}

/// Flattened `{page, page_size, total_records, total_pages, data}`.
pub async fn list_lead_sources(
    State(state): State<AppState>,
    Payload(req): Payload<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let page = fetch_page(state.store(), &LEAD_SOURCES, &req, Vec::new()).await?;
    let meta = page.meta();
    Ok(success_flat(
        json!({
            "page": meta.page,
            "page_size": meta.page_size,
            "total_records": meta.total_records,
            "total_pages": meta.total_pages,
            "data": page.rows(LEAD_SOURCES.fields),
        }),
        "Lead Sources fetched successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadSourceRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    /// Only `details` can change after creation.
    pub details: Option<String>,
}

pub async fn update_lead_source(
    State(state): State<AppState>,
    Payload(input): Payload<LeadSourceRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Lead Source name")?;
    let mut source = state
        .store
        .get("Lead Source", name)
        .await
        .map_err(not_found_as(format!("Lead Source with name '{}' does not exist", name)))?;
    if let Some(details) = &input.details {
        source.set("details", details.as_str());
    }
    let source = state.store.save(&source).await.log_failure("update lead source")?;
    Ok(success_flat(json!({ "name": source.name }), "Lead Source updated successfully"))
}

pub async fn delete_lead_source(
    State(state): State<AppState>,
    Payload(input): Payload<LeadSourceRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Lead Source name")?;
    state
        .store
        .delete("Lead Source", name)
        .await
        .map_err(not_found_as(format!("Lead Source with name '{}' does not exist", name)))?;
    Ok(success_flat(json!({ "name": name }), "Lead Source deleted successfully"))
}

pub async fn get_lead_source(
    State(state): State<AppState>,
    Payload(input): Payload<LeadSourceRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.name, "Lead Source name (ID)")?;
    let source = state
        .store
        .get("Lead Source", name)
        .await
        .map_err(not_found_as(format!("Lead Source with name '{}' does not exist", name)))?;
    Ok(success_flat(source.project(LEAD_SOURCE_DETAIL), "Lead Source fetched successfully"))
}
