//! Connection to the ledger node
//!
//! The oracle only needs a handful of node operations: log subscription,
//! historical log queries, account listing, read-only calls and transaction
//! submission. They are gathered behind [`ChainConnector`] so the responder
//! can run against the WebSocket client in production and an in-memory double
//! in tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethabi::{Address, Hash};
use futures_util::stream::BoxStream;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ChainError, RpcError};
use crate::models::LogPosition;

pub mod codec;
pub mod ws;

pub use ws::{WsConnector, WsConnectorFactory};

/// Live log notifications. Items are only `Err` for transport failures.
pub type LogStream = BoxStream<'static, Result<LogEntry, ChainError>>;

#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// Subscribe to logs matching `filter` as they are mined.
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogStream, ChainError>;

    /// Logs matching `filter` from `from_block` up to the latest block.
    async fn get_logs(&self, filter: &LogFilter, from_block: u64)
        -> Result<Vec<LogEntry>, ChainError>;

    /// Accounts managed by the node.
    async fn accounts(&self) -> Result<Vec<Address>, ChainError>;

    /// Read-only contract call against the latest block.
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError>;

    /// Hand a transaction to the node for signing and broadcast.
    async fn send_transaction(&self, request: &TransactionRequest) -> SubmissionOutcome;
}

/// Opens one [`ChainConnector`] per oracle session.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ChainConnector>, ChainError>;
}

/// Log filter for a single contract and event signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic: Hash,
}

impl LogFilter {
    pub fn to_json(&self) -> Value {
        json!({
            "address": codec::address(&self.address),
            "topics": [codec::hash(&self.topic)],
        })
    }
}

/// A mined log as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
    pub position: LogPosition,
    pub transaction_hash: Option<Hash>,
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl LogEntry {
    pub fn from_json(value: Value) -> Result<Self, ChainError> {
        let raw: RpcLog = serde_json::from_value(value)
            .map_err(|err| ChainError::Decode(format!("log: {err}")))?;

        let block_number = raw
            .block_number
            .as_deref()
            .ok_or_else(|| ChainError::Decode("log without blockNumber".to_string()))
            .and_then(codec::parse_quantity)?;
        let log_index = raw
            .log_index
            .as_deref()
            .ok_or_else(|| ChainError::Decode("log without logIndex".to_string()))
            .and_then(codec::parse_quantity)?;

        Ok(Self {
            address: codec::parse_address(&raw.address)?,
            topics: raw
                .topics
                .iter()
                .map(|topic| codec::parse_hash(topic))
                .collect::<Result<_, _>>()?,
            data: if raw.data.is_empty() {
                Vec::new()
            } else {
                codec::parse_bytes(&raw.data)?
            },
            position: LogPosition {
                block_number,
                log_index,
            },
            transaction_hash: raw
                .transaction_hash
                .as_deref()
                .map(codec::parse_hash)
                .transpose()?,
            removed: raw.removed,
        })
    }
}

/// `eth_call` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Vec<u8>,
}

impl CallRequest {
    pub fn to_json(&self) -> Value {
        let mut call = json!({
            "to": codec::address(&self.to),
            "data": codec::bytes(&self.data),
        });
        if let Some(from) = &self.from {
            call["from"] = Value::String(codec::address(from));
        }
        call
    }
}

/// `eth_sendTransaction` parameters. The node signs with `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub gas: u64,
    pub data: Vec<u8>,
}

impl TransactionRequest {
    pub fn to_json(&self) -> Value {
        json!({
            "from": codec::address(&self.from),
            "to": codec::address(&self.to),
            "gas": codec::quantity(self.gas),
            "data": codec::bytes(&self.data),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Network, nonce or gas trouble; the same call may succeed later.
    Retryable,
    /// The contract or node refused the call itself.
    Terminal,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::Retryable => "retryable",
            RejectionKind::Terminal => "terminal",
        }
    }
}

/// Result of handing a response transaction to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The node accepted the transaction for broadcast.
    Accepted { tx_hash: Hash },
    Rejected { kind: RejectionKind, reason: String },
    /// No acknowledgment arrived; the transaction may or may not be pending.
    Unknown { reason: String },
    /// The connection was gone before the transaction could be handed over.
    NotSent { reason: String },
}

impl SubmissionOutcome {
    pub fn from_rpc_error(error: &RpcError) -> Self {
        SubmissionOutcome::Rejected {
            kind: classify_rejection(error),
            reason: error.message.clone(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmissionOutcome::Rejected {
                kind: RejectionKind::Retryable,
                ..
            }
        )
    }

    /// True when the transaction never left this process, so the request
    /// still needs an answer.
    pub fn is_not_sent(&self) -> bool {
        matches!(self, SubmissionOutcome::NotSent { .. })
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionOutcome::Accepted { tx_hash } => write!(f, "accepted {tx_hash:?}"),
            SubmissionOutcome::Rejected { kind, reason } => {
                write!(f, "rejected ({}): {reason}", kind.as_str())
            }
            SubmissionOutcome::Unknown { reason } => write!(f, "unknown: {reason}"),
            SubmissionOutcome::NotSent { reason } => write!(f, "not sent: {reason}"),
        }
    }
}

const TERMINAL_MARKERS: &[&str] = &["revert", "invalid opcode", "already", "not allowed"];

const RETRYABLE_MARKERS: &[&str] = &[
    "insufficient funds",
    "nonce",
    "underpriced",
    "busy",
    "rate limit",
    "try again",
    "timeout",
];

/// Sort a node error into retryable or terminal. Anything unrecognised is
/// treated as terminal so it is never resent blindly.
pub fn classify_rejection(error: &RpcError) -> RejectionKind {
    let message = error.message.to_ascii_lowercase();

    // Geth reports reverts with code 3.
    if error.code == 3 || TERMINAL_MARKERS.iter().any(|marker| message.contains(marker)) {
        return RejectionKind::Terminal;
    }

    if RETRYABLE_MARKERS.iter().any(|marker| message.contains(marker)) {
        return RejectionKind::Retryable;
    }

    RejectionKind::Terminal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i64, message: &str) -> RpcError {
        RpcError {
            code,
            message: message.to_string(),
        }
    }

    #[test]
    fn reverts_are_terminal() {
        let revert = rpc(
            -32000,
            "VM Exception while processing transaction: revert Flight or timestamp do not match oracle request",
        );
        assert_eq!(classify_rejection(&revert), RejectionKind::Terminal);
        assert_eq!(classify_rejection(&rpc(3, "execution reverted")), RejectionKind::Terminal);
    }

    #[test]
    fn funding_and_nonce_problems_are_retryable() {
        assert_eq!(
            classify_rejection(&rpc(-32000, "insufficient funds for gas * price + value")),
            RejectionKind::Retryable
        );
        assert_eq!(
            classify_rejection(&rpc(-32000, "nonce too low")),
            RejectionKind::Retryable
        );
        assert_eq!(
            classify_rejection(&rpc(-32000, "replacement transaction underpriced")),
            RejectionKind::Retryable
        );
    }

    #[test]
    fn gas_limit_problems_are_terminal() {
        // The gas ceiling is fixed, so resending cannot help.
        assert_eq!(
            classify_rejection(&rpc(-32000, "intrinsic gas too low")),
            RejectionKind::Terminal
        );
        assert_eq!(
            classify_rejection(&rpc(-32000, "exceeds block gas limit")),
            RejectionKind::Terminal
        );
    }

    #[test]
    fn unknown_errors_are_terminal() {
        assert_eq!(classify_rejection(&rpc(-32601, "method not found")), RejectionKind::Terminal);
    }

    #[test]
    fn decodes_node_log() {
        let log = LogEntry::from_json(json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "topics": [format!("0x{}", "ab".repeat(32))],
            "data": "0x01",
            "blockNumber": "0x10",
            "logIndex": "0x2",
            "transactionHash": format!("0x{}", "cd".repeat(32)),
            "removed": false
        }))
        .unwrap();

        assert_eq!(log.position, LogPosition { block_number: 16, log_index: 2 });
        assert_eq!(log.data, vec![1]);
        assert_eq!(log.topics.len(), 1);
        assert!(log.transaction_hash.is_some());
    }

    #[test]
    fn pending_logs_are_rejected() {
        let err = LogEntry::from_json(json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "topics": [],
            "data": "0x",
            "blockNumber": null,
            "logIndex": null
        }))
        .unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
    }

    #[test]
    fn transaction_request_uses_hex_quantities() {
        let request = TransactionRequest {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            gas: 500_000,
            data: vec![0xde, 0xad],
        };
        let body = request.to_json();
        assert_eq!(body["gas"], "0x7a120");
        assert_eq!(body["data"], "0xdead");
    }
}
