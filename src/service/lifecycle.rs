//! Status gates for Draft/Submitted/Cancelled documents.

use crate::config::doctype_meta;
use crate::error::AppError;
use crate::store::{DocStatus, Document, DocumentStore};

fn require(doc: &Document, allowed: DocStatus, action: &str) -> Result<(), AppError> {
    if doc.docstatus == allowed {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Only {} {} can be {}",
        allowed.label(),
        doctype_meta(&doc.doctype).plural,
        action
    )))
}

/// `Only Draft <plural> can be <action>` unless the document is a Draft.
pub fn require_draft(doc: &Document, action: &str) -> Result<(), AppError> {
    require(doc, DocStatus::Draft, action)
}

/// `Only Submitted <plural> can be <action>` unless the document is Submitted.
pub fn require_submitted(doc: &Document, action: &str) -> Result<(), AppError> {
    require(doc, DocStatus::Submitted, action)
}

pub async fn submit(store: &dyn DocumentStore, doc: &Document) -> Result<Document, AppError> {
    require_draft(doc, "submitted")?;
    Ok(store.set_docstatus(&doc.doctype, &doc.name, DocStatus::Submitted).await?)
}

pub async fn cancel(store: &dyn DocumentStore, doc: &Document) -> Result<Document, AppError> {
    require_submitted(doc, "cancelled")?;
    Ok(store.set_docstatus(&doc.doctype, &doc.name, DocStatus::Cancelled).await?)
}

/// Deletes a document, cancelling it first when it is Submitted.
pub async fn cancel_and_delete(store: &dyn DocumentStore, doc: &Document) -> Result<(), AppError> {
    if doc.docstatus == DocStatus::Submitted {
        store.set_docstatus(&doc.doctype, &doc.name, DocStatus::Cancelled).await?;
    }
    store.delete(&doc.doctype, &doc.name).await?;
    Ok(())
}
