//! Oracle services

pub mod oracle_service;
pub mod responder;
pub mod stats;

pub use oracle_service::OracleService;
pub use responder::{OracleResponder, ResponderConfig, SubmissionReport};
pub use stats::{OracleStats, StatsSnapshot};
