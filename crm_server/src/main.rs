//! CRM server: reads settings from the environment, opens the document store, serves the RPC routes.
//!
//! Run from repo root: `cargo run -p crm-server`

use crm_api::{reminder, router, AppState, DocumentStore, MemoryDocumentStore, PgDocumentStore, Settings, StoreBackend};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crm_api=info,crm_server=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let store: Arc<dyn DocumentStore> = match settings.store {
        StoreBackend::Postgres => Arc::new(PgDocumentStore::connect(&settings).await?),
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; documents are lost on exit");
            Arc::new(MemoryDocumentStore::new())
        }
    };
    let state = AppState::new(store);

    if let Some(interval) = settings.reminder_interval {
        reminder::spawn(
            state.store.clone(),
            state.mailer.clone(),
            interval,
            settings.default_reminder_minutes,
        );
        tracing::info!(every_secs = interval.as_secs(), "event reminder job started");
    }

    let app = router(state)
        .layer(RequestBodyLimitLayer::new(settings.max_body_bytes))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
