//! Shared application state for all routes.

use crate::mailer::{Mailer, QueueMailer};
use crate::store::DocumentStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// State with the queueing mailer writing into the same store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let mailer: Arc<dyn Mailer> = Arc::new(QueueMailer::new(store.clone()));
        AppState { store, mailer }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}
