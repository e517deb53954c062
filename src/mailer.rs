//! Outgoing mail. The default mailer only enqueues an `Email Queue` document; delivery happens elsewhere.

use crate::error::StoreError;
use crate::store::{DocumentStore, NewDocument};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct Email {
    pub recipients: Vec<String>,
    pub subject: String,
    pub message: String,
    pub reference_doctype: Option<String>,
    pub reference_name: Option<String>,
}

impl Email {
    pub fn new(recipients: Vec<String>, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Email {
            recipients,
            subject: subject.into(),
            message: message.into(),
            reference_doctype: None,
            reference_name: None,
        }
    }

    pub fn reference(mut self, doctype: &str, name: &str) -> Self {
        self.reference_doctype = Some(doctype.to_string());
        self.reference_name = Some(name.to_string());
        self
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns an id for the queued message.
    async fn send(&self, email: Email) -> Result<String, StoreError>;
}

/// Writes each message as an `Email Queue` document with status `Not Sent`.
#[derive(Clone)]
pub struct QueueMailer {
    store: Arc<dyn DocumentStore>,
    owner: String,
}

impl QueueMailer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        QueueMailer {
            store,
            owner: crate::extractors::DEFAULT_USER.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for QueueMailer {
    async fn send(&self, email: Email) -> Result<String, StoreError> {
        let mut fields = Map::new();
        fields.insert(
            "recipients".into(),
            Value::Array(
                email
                    .recipients
                    .iter()
                    .map(|r| json!({"recipient": r, "status": "Not Sent"}))
                    .collect(),
            ),
        );
        fields.insert("subject".into(), Value::String(email.subject));
        fields.insert("message".into(), Value::String(email.message));
        fields.insert("status".into(), Value::String("Not Sent".into()));
        if let Some(d) = email.reference_doctype {
            fields.insert("reference_doctype".into(), Value::String(d));
        }
        if let Some(n) = email.reference_name {
            fields.insert("reference_name".into(), Value::String(n));
        }
        let queued = self
            .store
            .insert(NewDocument::new("Email Queue", self.owner.clone(), fields))
            .await?;
        tracing::info!(queue = %queued.name, recipients = email.recipients.len(), "email queued");
        Ok(queued.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    #[tokio::test]
    async fn queues_one_document_per_message() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let mailer = QueueMailer::new(store.clone());
        let email = Email::new(vec!["ada@example.com".into()], "Reminder: Demo", "<p>Demo</p>").reference("Event", "EV00001");
        let id = mailer.send(email).await.unwrap();
        let queued = store.get("Email Queue", &id).await.unwrap();
        assert_eq!(queued.str_field("status"), Some("Not Sent"));
        assert_eq!(queued.table("recipients")[0]["recipient"], "ada@example.com");
        assert_eq!(queued.str_field("reference_name"), Some("EV00001"));
    }
}
