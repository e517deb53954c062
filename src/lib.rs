//! CRM API: RPC-style CRM and selling endpoints over a JSONB document store.

pub mod config;
pub mod dates;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod mailer;
pub mod migration;
pub mod reminder;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{Settings, StoreBackend};
pub use error::{AppError, ConfigError, StoreError};
pub use mailer::{Email, Mailer, QueueMailer};
pub use migration::{ensure_database_exists, ensure_document_tables};
pub use response::{api_error, api_response};
pub use routes::{common_routes, crm_routes};
pub use state::AppState;
pub use store::{DocumentStore, MemoryDocumentStore, PgDocumentStore};

use axum::Router;

/// Health routes plus every `/api/method/crm_api.*` endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(crm_routes(state))
}
