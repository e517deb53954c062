//! Event endpoints: assignment list, events created from Leads, assignment mail and rescheduling.

use crate::dates::{format_datetime, parse_datetime};
use crate::error::{not_found_as, AppError, LogFailure, StoreError};
use crate::extractors::{lenient, Payload, RequestContext};
use crate::mailer::{Email, Mailer};
use crate::response::{success, success_flat};
use crate::service::{fetch_page, required, ListSpec, PageRequest};
use crate::state::AppState;
use crate::store::{Condition, Document, DocumentStore, Filter, ListQuery, NewDocument, SortOrder};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map};

const ASSIGNMENTS: ListSpec = ListSpec::new("ToDo", &["name", "reference_name", "allocated_to", "status", "creation"])
    .search(&["reference_name", "allocated_to"])
    .sort(&[], "creation", SortOrder::Desc)
    .page_size(20);

/// What happened to an assignment mail.
#[derive(Debug, PartialEq)]
pub enum AssignmentMail {
    Sent { event: String, user: String },
    Ignored(&'static str),
}

/// Mails the ToDo's assignee about the referenced Event.
pub async fn mail_assignment(
    store: &dyn DocumentStore,
    mailer: &dyn Mailer,
    todo: &Document,
) -> Result<AssignmentMail, AppError> {
    if todo.str_field("reference_type") != Some("Event") {
        return Ok(AssignmentMail::Ignored("Not an Event assignment"));
    }
    let Some(event_name) = todo.str_field("reference_name").filter(|s| !s.is_empty()) else {
        return Ok(AssignmentMail::Ignored("No reference"));
    };
    let event = store
        .get("Event", event_name)
        .await
        .map_err(not_found_as(format!("Event {} not found", event_name)))?;
    let user = todo.str_field("allocated_to").unwrap_or_default().to_string();
    let email = match store.get("User", &user).await {
        Ok(u) => u.str_field("email").filter(|e| !e.is_empty()).map(str::to_string),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let Some(email) = email else {
        return Ok(AssignmentMail::Ignored("User email not found"));
    };

    let subject = event.str_field("subject").unwrap_or_default();
    let starts = event
        .str_field("starts_on")
        .and_then(parse_datetime)
        .map(format_datetime)
        .unwrap_or_default();
    let message = format!(
        "Hello,\n\nThis is a reminder for the event: {}\nStarts at: {}\n\nThank you.\n",
        subject, starts
    );
    mailer
        .send(Email::new(vec![email], format!("Reminder for Event: {}", subject), message).reference("Event", &event.name))
        .await?;
    tracing::info!(event = %event.name, user = %user, "assignment mail queued");
    Ok(AssignmentMail::Sent { event: event.name, user })
}

#[derive(Debug, Default, Deserialize)]
pub struct TodoRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub todo: Option<String>,
}

pub async fn send_event_assignment_email(
    State(state): State<AppState>,
    Payload(input): Payload<TodoRef>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.todo, "ToDo ID")?;
    let todo = state
        .store
        .get("ToDo", name)
        .await
        .map_err(not_found_as(format!("ToDo {} not found", name)))?;
    let outcome = mail_assignment(state.store(), state.mailer.as_ref(), &todo)
        .await
        .log_failure("assignment mail")?;
    Ok(match outcome {
        AssignmentMail::Sent { event, user } => {
            success_flat(json!({ "event": event, "user": user }), "Custom assignment email sent")
        }
        AssignmentMail::Ignored(reason) => (StatusCode::OK, Json(json!({ "status": "ignored", "reason": reason }))),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentParams {
    #[serde(flatten)]
    pub page: PageRequest,
    /// `today`, `upcoming`, or anything else for every event.
    pub filter_type: Option<String>,
}

fn event_window(filter_type: Option<&str>, today: NaiveDate) -> Vec<Filter> {
    let start = format!("{} 00:00:00", today);
    let end = format!("{} 23:59:59", today);
    match filter_type.map(str::trim) {
        Some("today") => vec![Filter::new("starts_on", Condition::Between(json!(start), json!(end)))],
        Some("upcoming") => vec![Filter::new("starts_on", Condition::Gt(json!(end)))],
        _ => Vec::new(),
    }
}

pub async fn get_event_assignments(
    State(state): State<AppState>,
    Payload(params): Payload<AssignmentParams>,
) -> Result<impl IntoResponse, AppError> {
    let today = Utc::now().date_naive();
    let events = state
        .store
        .list(
            &ListQuery::new("Event")
                .fields(&["name"])
                .filters(event_window(params.filter_type.as_deref(), today)),
        )
        .await
        .log_failure("event assignments")?;
    if events.is_empty() {
        return Ok(success(
            json!({
                "page": params.page.page.unwrap_or(1).max(1),
                "page_size": params.page.page_size.unwrap_or(ASSIGNMENTS.default_page_size),
                "total_records": 0,
                "total_pages": 0,
                "data": [],
            }),
            "No events found",
        ));
    }

    let names = events.iter().map(|e| json!(e.name)).collect();
    let filters = vec![Filter::eq("reference_type", "Event"), Filter::is_in("reference_name", names)];
    let page = fetch_page(state.store(), &ASSIGNMENTS, &params.page, filters)
        .await
        .log_failure("event assignments")?;

    let mut rows = Vec::with_capacity(page.results.len());
    for todo in &page.results {
        let event_name = todo.str_field("reference_name").unwrap_or_default();
        let event = match state.store.get("Event", event_name).await {
            Ok(e) => Some(e),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        rows.push(json!({
            "todo": todo.name,
            "event": event_name,
            "event_subject": event.as_ref().and_then(|e| e.value("subject")),
            "starts_on": event.as_ref().and_then(|e| e.value("starts_on")),
            "assigned_to": todo.value("allocated_to"),
            "status": todo.value("status"),
        }));
    }
    let meta = page.meta();
    Ok(success(
        json!({
            "page": meta.page,
            "page_size": meta.page_size,
            "total_records": meta.total_records,
            "total_pages": meta.total_pages,
            "data": rows,
        }),
        "Event Assignment List Fetched Successfully",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventFromLead {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub lead: Option<String>,
    pub subject: Option<String>,
    pub starts_on: Option<String>,
    pub ends_on: Option<String>,
    pub assigned_to: Option<String>,
    pub description: Option<String>,
}

fn timestamp(field: &str, value: &str) -> Result<NaiveDateTime, AppError> {
    parse_datetime(value).ok_or_else(|| AppError::Validation(format!("Invalid {}: {}", field, value)))
}

/// Private Event referencing the Lead. With `assigned_to`, a ToDo is created and its assignee mailed.
pub async fn create_event_from_lead(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(input): Payload<EventFromLead>,
) -> Result<impl IntoResponse, AppError> {
    let given = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let (Some(lead), Some(subject), Some(starts_on)) = (given(&input.lead), given(&input.subject), given(&input.starts_on))
    else {
        return Err(AppError::Validation("lead, subject, starts_on required".into()));
    };
    if !state.store.exists("Lead", &lead).await? {
        return Err(AppError::NotFound("Lead not found".into()));
    }
    let starts_on = format_datetime(timestamp("starts_on", &starts_on)?);

    let mut fields = Map::new();
    fields.insert("subject".into(), json!(subject));
    fields.insert("starts_on".into(), json!(starts_on));
    if let Some(ends_on) = given(&input.ends_on) {
        fields.insert("ends_on".into(), json!(format_datetime(timestamp("ends_on", &ends_on)?)));
    }
    if let Some(description) = &input.description {
        fields.insert("description".into(), json!(description));
    }
    fields.insert("event_type".into(), json!("Private"));
    fields.insert("status".into(), json!("Open"));
    fields.insert("send_reminder".into(), json!(1));
    fields.insert("reference_doctype".into(), json!("Lead"));
    fields.insert("reference_docname".into(), json!(lead));
    let event = state
        .store
        .insert(NewDocument::new("Event", &ctx.user, fields))
        .await
        .log_failure("create event from lead")?;

    let assigned_to = given(&input.assigned_to);
    let mut todo_name = None;
    if let Some(user) = &assigned_to {
        let mut todo = Map::new();
        todo.insert("allocated_to".into(), json!(user));
        todo.insert("reference_type".into(), json!("Event"));
        todo.insert("reference_name".into(), json!(event.name));
        todo.insert("description".into(), json!(subject));
        todo.insert("status".into(), json!("Open"));
        let todo = state
            .store
            .insert(NewDocument::new("ToDo", &ctx.user, todo))
            .await
            .log_failure("create event from lead")?;
        if let Err(e) = mail_assignment(state.store(), state.mailer.as_ref(), &todo).await {
            tracing::warn!(error = %e, todo = %todo.name, "assignment mail not sent");
        }
        todo_name = Some(todo.name);
    }

    Ok(success(
        json!({
            "event": event.name,
            "lead": lead,
            "subject": subject,
            "starts_on": starts_on,
            "assigned_to": assigned_to,
            "todo": todo_name,
        }),
        "Event Created Successfully from Lead",
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct RescheduleEvent {
    #[serde(default, alias = "name", deserialize_with = "lenient::opt_text")]
    pub event: Option<String>,
    pub starts_on: Option<String>,
    pub ends_on: Option<String>,
}

/// A new `starts_on` re-arms the reminder.
pub async fn reschedule_event(
    State(state): State<AppState>,
    Payload(input): Payload<RescheduleEvent>,
) -> Result<impl IntoResponse, AppError> {
    let name = required(&input.event, "Event name")?;
    let starts_on = format_datetime(timestamp("starts_on", required(&input.starts_on, "starts_on")?)?);
    let mut event = state
        .store
        .get("Event", name)
        .await
        .map_err(not_found_as(format!("Event {} not found", name)))?;

    let previous = event.str_field("starts_on").and_then(parse_datetime).map(format_datetime);
    if previous.as_deref() != Some(starts_on.as_str()) {
        event.set("starts_on", starts_on.as_str());
        event.set("custom_reminder_sent", 0);
    }
    if let Some(ends_on) = input.ends_on.as_deref().filter(|s| !s.trim().is_empty()) {
        event.set("ends_on", format_datetime(timestamp("ends_on", ends_on)?));
    }
    let event = state.store.save(&event).await.log_failure("reschedule event")?;
    Ok(success_flat(
        json!({
            "event": event.name,
            "starts_on": event.value("starts_on"),
            "custom_reminder_sent": event.value("custom_reminder_sent"),
        }),
        "Event rescheduled successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::QueueMailer;
    use crate::store::MemoryDocumentStore;
    use serde_json::Value;
    use std::sync::Arc;

    async fn insert(store: &dyn DocumentStore, doctype: &str, v: Value) -> Document {
        let Value::Object(fields) = v else { panic!("object expected") };
        store.insert(NewDocument::new(doctype, "Administrator", fields)).await.unwrap()
    }

    #[test]
    fn windows_bound_starts_on() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        assert_eq!(
            event_window(Some("upcoming"), today),
            vec![Filter::new("starts_on", Condition::Gt(json!("2025-04-01 23:59:59")))]
        );
        assert_eq!(event_window(Some("today"), today).len(), 1);
        assert!(event_window(None, today).is_empty());
    }

    #[tokio::test]
    async fn assignment_mail_needs_an_event_and_an_address() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let mailer = QueueMailer::new(store.clone());
        insert(store.as_ref(), "User", json!({"email": "sam@example.com"})).await;
        let event = insert(store.as_ref(), "Event", json!({"subject": "Demo", "starts_on": "2025-04-02 10:00:00"})).await;

        let other = insert(store.as_ref(), "ToDo", json!({"reference_type": "Lead", "reference_name": "X"})).await;
        assert_eq!(
            mail_assignment(store.as_ref(), &mailer, &other).await.unwrap(),
            AssignmentMail::Ignored("Not an Event assignment")
        );

        let nobody = insert(
            store.as_ref(),
            "ToDo",
            json!({"reference_type": "Event", "reference_name": event.name, "allocated_to": "ghost@example.com"}),
        )
        .await;
        assert_eq!(
            mail_assignment(store.as_ref(), &mailer, &nobody).await.unwrap(),
            AssignmentMail::Ignored("User email not found")
        );

        let todo = insert(
            store.as_ref(),
            "ToDo",
            json!({"reference_type": "Event", "reference_name": event.name, "allocated_to": "sam@example.com"}),
        )
        .await;
        let sent = mail_assignment(store.as_ref(), &mailer, &todo).await.unwrap();
        assert_eq!(
            sent,
            AssignmentMail::Sent {
                event: event.name.clone(),
                user: "sam@example.com".into()
            }
        );
        let queued = store
            .find_one("Email Queue", vec![Filter::eq("reference_name", event.name.as_str())])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queued.str_field("subject"), Some("Reminder for Event: Demo"));
    }
}
