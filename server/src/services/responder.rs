//! Oracle responder: answers `OracleRequest` events for the assigned indexes

use std::sync::Arc;
use std::time::Duration;

use ethabi::Address;
use futures_util::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::abi::OracleContract;
use crate::chain::{ChainConnector, RejectionKind, SubmissionOutcome, TransactionRequest};
use crate::error::ChainError;
use crate::event_listener::EventStream;
use crate::models::{
    LogPosition, OracleIndexSet, OracleRequestEvent, OracleResponse, MAX_STATUS_CODE,
};
use crate::services::stats::OracleStats;

const RETRY_BACKOFF_MILLIS: u64 = 500;

/// Everything the responder needs, fixed at construction.
#[derive(Clone)]
pub struct ResponderConfig {
    pub connector: Arc<dyn ChainConnector>,
    pub contract: OracleContract,
    pub indexes: OracleIndexSet,
    pub account: Address,
    pub gas_limit: u64,
    /// Extra attempts for retryable rejections.
    pub submit_retries: u32,
}

/// What happened to one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    pub response: OracleResponse,
    pub outcome: SubmissionOutcome,
    pub attempts: u32,
}

pub struct OracleResponder {
    config: ResponderConfig,
    stats: Arc<OracleStats>,
    rng: StdRng,
    retry_backoff: Duration,
}

impl OracleResponder {
    pub fn new(config: ResponderConfig, stats: Arc<OracleStats>) -> Self {
        Self {
            config,
            stats,
            rng: StdRng::from_entropy(),
            retry_backoff: Duration::from_millis(RETRY_BACKOFF_MILLIS),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Respond to one request: one submission per assigned index equal to
    /// the request's index. Redelivered requests are answered again.
    pub async fn handle_event(&mut self, event: &OracleRequestEvent) -> Vec<SubmissionReport> {
        let matching: Vec<u8> = self.config.indexes.matching(event.index).collect();
        self.stats.record_event(!matching.is_empty());

        if matching.is_empty() {
            debug!(index = event.index, flight = %event.flight, "request not assigned to this oracle");
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(matching.len());
        for index in matching {
            let status_code = self.rng.gen_range(0..=MAX_STATUS_CODE);
            let response = OracleResponse::for_request(index, event, status_code);
            let report = self.submit(response, event).await;
            let not_sent = report.outcome.is_not_sent();
            reports.push(report);
            if not_sent {
                // The rest would fail the same way on a dead connection.
                break;
            }
        }
        reports
    }

    async fn submit(
        &self,
        response: OracleResponse,
        event: &OracleRequestEvent,
    ) -> SubmissionReport {
        let data = match self.config.contract.encode_response(&response) {
            Ok(data) => data,
            Err(err) => {
                error!(error_kind = "abi", error = %err, "failed to encode oracle response");
                let outcome = SubmissionOutcome::Rejected {
                    kind: RejectionKind::Terminal,
                    reason: err.to_string(),
                };
                self.stats.record_submission(&outcome);
                return SubmissionReport {
                    response,
                    outcome,
                    attempts: 0,
                };
            }
        };

        let request = TransactionRequest {
            from: self.config.account,
            to: self.config.contract.address(),
            gas: self.config.gas_limit,
            data,
        };

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let outcome = self.config.connector.send_transaction(&request).await;
            if outcome.is_retryable() && attempts <= self.config.submit_retries {
                warn!(
                    index = response.index,
                    flight = %response.flight,
                    attempts,
                    %outcome,
                    "retrying oracle response"
                );
                tokio::time::sleep(self.retry_backoff * attempts).await;
                continue;
            }
            break outcome;
        };

        self.stats.record_submission(&outcome);
        match &outcome {
            SubmissionOutcome::Accepted { tx_hash } => info!(
                index = response.index,
                airline = ?response.airline,
                flight = %response.flight,
                timestamp = %response.timestamp,
                status_code = response.status_code,
                request_tx = ?event.transaction_hash,
                ?tx_hash,
                "Submitted oracle response"
            ),
            SubmissionOutcome::Rejected { kind, reason } => error!(
                error_kind = "submission",
                rejection = kind.as_str(),
                index = response.index,
                flight = %response.flight,
                request_tx = ?event.transaction_hash,
                attempts,
                %reason,
                "oracle response rejected"
            ),
            SubmissionOutcome::Unknown { reason } => warn!(
                error_kind = "submission",
                index = response.index,
                flight = %response.flight,
                request_tx = ?event.transaction_hash,
                %reason,
                "oracle response not acknowledged"
            ),
            SubmissionOutcome::NotSent { reason } => warn!(
                error_kind = "transport",
                index = response.index,
                flight = %response.flight,
                position = %event.position,
                %reason,
                "oracle response not sent, request left unacknowledged"
            ),
        }

        SubmissionReport {
            response,
            outcome,
            attempts,
        }
    }

    /// Process deliveries in order until shutdown or a transport failure.
    ///
    /// `acknowledged` advances only after an event has been fully handled,
    /// so a reconnect resumes with the first unfinished event. An event whose
    /// response could not be handed to the node ends the run unacknowledged.
    pub async fn run(
        &mut self,
        mut events: EventStream,
        acknowledged: &mut Option<LogPosition>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ChainError> {
        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("oracle responder stopping");
                    return Ok(());
                }
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        let reports = self.handle_event(&event).await;
                        if reports.iter().any(|report| report.outcome.is_not_sent()) {
                            return Err(ChainError::Disconnected);
                        }
                        *acknowledged = Some(event.position);
                        self.stats.acknowledge(event.position);
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Err(ChainError::Disconnected),
                }
            }
        }
    }
}
