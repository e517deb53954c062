//! Event reminder job: mails participants of Open events once their reminder window opens.

use crate::dates::parse_datetime;
use crate::error::StoreError;
use crate::mailer::{Email, Mailer};
use crate::store::{Document, DocumentStore, Filter, ListQuery};
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Minutes before `starts_on` at which the owner's reminder fires.
async fn lead_minutes(store: &dyn DocumentStore, owner: &str, default_minutes: i64) -> Result<i64, StoreError> {
    let employee = store.find_one("Employee", vec![Filter::eq("user_id", owner)]).await?;
    let minutes = employee
        .and_then(|e| e.fields.get("custom_event_reminder").and_then(as_minutes))
        .filter(|m| *m > 0);
    Ok(minutes.unwrap_or(default_minutes))
}

fn as_minutes(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn field_of(store: &dyn DocumentStore, doctype: &str, name: &str, field: &str) -> Result<Option<String>, StoreError> {
    match store.get(doctype, name).await {
        Ok(doc) => Ok(doc.str_field(field).map(str::to_string)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Address for one participant row: its own `email`, else looked up from the referenced document.
async fn participant_email(store: &dyn DocumentStore, row: &Value) -> Result<Option<String>, StoreError> {
    let own = row.get("email").and_then(Value::as_str).filter(|s| !s.is_empty());
    if let Some(email) = own {
        return Ok(Some(email.to_string()));
    }
    let doctype = row.get("reference_doctype").and_then(Value::as_str).unwrap_or("");
    let Some(name) = row.get("reference_docname").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match doctype {
        "User" => field_of(store, "User", name, "email").await,
        "Lead" => field_of(store, "Lead", name, "email_id").await,
        "Prospect" => {
            let link = json!([{"link_doctype": "Prospect", "link_name": name}]);
            let contact = store
                .find_one("Contact", vec![Filter::json_contains("links", link)])
                .await?;
            Ok(contact.and_then(|c| c.str_field("email_id").map(str::to_string)))
        }
        "Employee" => match store.get("Employee", name).await {
            Ok(emp) => Ok(["prefered_email", "company_email", "personal_email", "user_id"]
                .iter()
                .find_map(|f| emp.str_field(f))
                .map(str::to_string)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        },
        _ => Ok(None),
    }
}

/// Distinct participant addresses in first-seen order.
pub async fn participant_emails(store: &dyn DocumentStore, event: &Document) -> Result<Vec<String>, StoreError> {
    let mut emails: Vec<String> = Vec::new();
    for row in event.table("event_participants") {
        if let Some(email) = participant_email(store, row).await? {
            if !emails.contains(&email) {
                emails.push(email);
            }
        }
    }
    Ok(emails)
}

fn reminder_email(event: &Document, starts_on: NaiveDateTime, recipients: Vec<String>) -> Email {
    let subject = event.str_field("subject").unwrap_or(&event.name);
    let all_day = event.fields.get("all_day").map(|v| v == &json!(1) || v == &json!(true)).unwrap_or(false);
    let time = if all_day {
        "All Day".to_string()
    } else {
        starts_on.format("%I:%M %p").to_string()
    };
    Email::new(
        recipients,
        format!("Reminder: {}", subject),
        format!(
            "<p>This is a reminder for the event:</p>\n<p><b>{}</b></p>\n<p>Starts at: {}</p>",
            subject, time
        ),
    )
    .reference("Event", &event.name)
}

/// One pass over pending reminders at `now` (UTC). Returns how many events were mailed.
pub async fn run_once(
    store: &dyn DocumentStore,
    mailer: &dyn Mailer,
    now: NaiveDateTime,
    default_minutes: i64,
) -> Result<usize, StoreError> {
    let query = ListQuery::new("Event").filters(vec![
        Filter::eq("status", "Open"),
        Filter::eq("send_reminder", 1),
        Filter::not_in("custom_reminder_sent", vec![json!(1)]),
    ]);
    let events = store.list(&query).await?;
    let mut sent = 0;
    for event in events {
        let Some(starts_on) = event.str_field("starts_on").and_then(parse_datetime) else {
            tracing::debug!(event = %event.name, "event without a start time");
            continue;
        };
        let minutes = lead_minutes(store, &event.owner, default_minutes).await?;
        let Some(trigger) = ChronoDuration::try_minutes(minutes).and_then(|lead| starts_on.checked_sub_signed(lead))
        else {
            tracing::warn!(event = %event.name, minutes, "reminder lead time out of range");
            continue;
        };
        if !(trigger <= now && now < starts_on) {
            continue;
        }
        let recipients = participant_emails(store, &event).await?;
        if recipients.is_empty() {
            tracing::debug!(event = %event.name, "no participant email resolved");
            continue;
        }
        mailer.send(reminder_email(&event, starts_on, recipients)).await?;
        store
            .set_value("Event", &event.name, "custom_reminder_sent", json!(1), false)
            .await?;
        tracing::info!(event = %event.name, "event reminder sent");
        sent += 1;
    }
    Ok(sent)
}

/// Runs [`run_once`] every `interval` until the runtime shuts down.
pub fn spawn(
    store: Arc<dyn DocumentStore>,
    mailer: Arc<dyn Mailer>,
    interval: Duration,
    default_minutes: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = Utc::now().naive_utc();
            match run_once(store.as_ref(), mailer.as_ref(), now, default_minutes).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(sent = n, "reminder pass finished"),
                Err(e) => tracing::error!(error = %e, "reminder pass failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::QueueMailer;
    use crate::store::{MemoryDocumentStore, NewDocument};
    use serde_json::Map;

    fn fields(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    async fn insert(store: &dyn DocumentStore, doctype: &str, owner: &str, v: Value) -> Document {
        store.insert(NewDocument::new(doctype, owner, fields(v))).await.unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    #[tokio::test]
    async fn sends_inside_window_once() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let mailer = QueueMailer::new(store.clone());
        insert(store.as_ref(), "Employee", "Administrator", json!({"user_id": "rep@acme.test", "custom_event_reminder": 30})).await;
        let lead = insert(store.as_ref(), "Lead", "rep@acme.test", json!({"first_name": "Ada", "email_id": "ada@example.com"})).await;
        insert(store.as_ref(), "Contact", "Administrator", json!({
            "email_id": "buyer@globex.test",
            "links": [{"link_doctype": "Prospect", "link_name": "Globex"}]
        }))
        .await;
        let event = insert(store.as_ref(), "Event", "rep@acme.test", json!({
            "subject": "Demo",
            "status": "Open",
            "send_reminder": 1,
            "starts_on": "2025-03-14 10:00:00",
            "event_participants": [
                {"reference_doctype": "Lead", "reference_docname": lead.name},
                {"email": "ada@example.com"},
                {"reference_doctype": "Prospect", "reference_docname": "Globex"},
                {"reference_doctype": "User", "reference_docname": "ghost@acme.test"}
            ]
        }))
        .await;

        let n = run_once(store.as_ref(), &mailer, at("2025-03-14 09:20:00"), 60).await.unwrap();
        assert_eq!(n, 0, "outside the 30 minute window");

        let n = run_once(store.as_ref(), &mailer, at("2025-03-14 09:45:00"), 60).await.unwrap();
        assert_eq!(n, 1);
        let queued = store.find_one("Email Queue", vec![]).await.unwrap().unwrap();
        assert_eq!(queued.table("recipients").len(), 2);
        assert_eq!(queued.str_field("subject"), Some("Reminder: Demo"));

        let stored = store.get("Event", &event.name).await.unwrap();
        assert_eq!(stored.fields["custom_reminder_sent"], json!(1));
        assert_eq!(stored.modified, event.modified);

        let n = run_once(store.as_ref(), &mailer, at("2025-03-14 09:50:00"), 60).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn out_of_range_lead_time_skips_only_that_event() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let mailer = QueueMailer::new(store.clone());
        insert(store.as_ref(), "Employee", "Administrator", json!({"user_id": "rep@acme.test", "custom_event_reminder": 9e15})).await;
        let skipped = insert(store.as_ref(), "Event", "rep@acme.test", json!({
            "subject": "Far",
            "status": "Open",
            "send_reminder": 1,
            "starts_on": "2025-03-14 10:00:00",
            "event_participants": [{"email": "ada@example.com"}]
        }))
        .await;
        insert(store.as_ref(), "Event", "other@acme.test", json!({
            "subject": "Near",
            "status": "Open",
            "send_reminder": 1,
            "starts_on": "2025-03-14 10:00:00",
            "event_participants": [{"email": "bob@example.com"}]
        }))
        .await;

        let n = run_once(store.as_ref(), &mailer, at("2025-03-14 09:30:00"), 60).await.unwrap();
        assert_eq!(n, 1);
        let stored = store.get("Event", &skipped.name).await.unwrap();
        assert!(stored.fields.get("custom_reminder_sent").is_none());
    }

    #[tokio::test]
    async fn skips_events_without_addresses() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let mailer = QueueMailer::new(store.clone());
        insert(store.as_ref(), "Event", "nobody@acme.test", json!({
            "subject": "Call",
            "status": "Open",
            "send_reminder": 1,
            "starts_on": "2025-03-14 10:00:00",
            "event_participants": [{"reference_doctype": "Lead", "reference_docname": "CRM-LEAD-2025-09999"}]
        }))
        .await;
        let n = run_once(store.as_ref(), &mailer, at("2025-03-14 09:30:00"), 60).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.count("Email Queue", &[], &[]).await.unwrap(), 0);
    }
}
