//! Shared application state.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use postcraft_db::Database;
use postcraft_dispatch::Dispatcher;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub dispatcher: Arc<Dispatcher>,
    dispatch_secret: Arc<str>,
}

impl AppState {
    pub fn new(db: Database, dispatcher: Dispatcher, dispatch_secret: impl Into<Arc<str>>) -> Self {
        AppState {
            db,
            dispatcher: Arc::new(dispatcher),
            dispatch_secret: dispatch_secret.into(),
        }
    }

    /// Constant-time check of a presented dispatch secret.
    pub fn secret_matches(&self, presented: &str) -> bool {
        self.dispatch_secret
            .as_bytes()
            .ct_eq(presented.as_bytes())
            .into()
    }
}
