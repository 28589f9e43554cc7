//! Application state for Axum handlers.

use crate::gateway::Gateway;
use lumen_jobs::JobService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub jobs: JobService,
    /// Cookie carrying the session token.
    pub token_cookie: Arc<str>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(gateway: Arc<Gateway>, jobs: JobService, token_cookie: impl Into<Arc<str>>) -> Self {
        Self {
            gateway,
            jobs,
            token_cookie: token_cookie.into(),
        }
    }
}
