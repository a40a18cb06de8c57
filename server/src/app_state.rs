//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::services::OracleStats;

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    pub stats: Arc<OracleStats>,
}

impl AppState {
    pub fn new(stats: Arc<OracleStats>) -> Self {
        Self { stats }
    }
}

impl FromRef<AppState> for Arc<OracleStats> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.stats.clone()
    }
}
