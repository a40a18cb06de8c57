//! Data models for the oracle service

use serde::Serialize;

pub mod oracle;

pub use oracle::{
    LogPosition, OracleIndexSet, OracleRequestEvent, OracleResponse, MAX_STATUS_CODE,
};

/// Body of `GET /api`
#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: &'static str,
}
