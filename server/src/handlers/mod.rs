//! HTTP handlers

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::models::ApiMessage;
use crate::services::{OracleStats, StatsSnapshot};

pub const API_MESSAGE: &str = "An API for use with your Dapp!";

/// Static description of the service. Does not depend on the node.
pub async fn api_info() -> Json<ApiMessage> {
    Json(ApiMessage {
        message: API_MESSAGE,
    })
}

pub async fn health_check(State(stats): State<Arc<OracleStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}
