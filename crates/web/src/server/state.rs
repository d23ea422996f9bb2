//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::api::Backend;
use crate::session::SessionManager;

/// Application state shared across all request handlers.
///
/// Built once at startup and cloned per request; every field is `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    /// Backend API, behind a trait so handlers can be exercised without one.
    pub backend: Arc<dyn Backend>,
    /// Session loading and persistence.
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, sessions: SessionManager) -> Self {
        Self { backend, sessions }
    }
}
