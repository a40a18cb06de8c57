//! Error types for the oracle service

use std::fmt;

use thiserror::Error;

/// Errors raised while loading configuration. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("network {0} not found in config file")]
    UnknownNetwork(String),

    #[error(transparent)]
    Abi(#[from] AbiError),
}

/// Errors raised while loading or using a contract ABI.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("malformed ABI document: {0}")]
    Malformed(String),

    #[error("ABI does not declare {0}")]
    MissingItem(&'static str),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },
}

/// JSON-RPC error object returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Errors raised by a chain connector.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    Disconnected,

    #[error("{method} timed out")]
    Timeout { method: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("no account available to sign responses")]
    NoAccount,

    #[error("no oracle indexes assigned: {0}")]
    NoIndexes(String),

    #[error(transparent)]
    Abi(#[from] AbiError),
}

impl ChainError {
    /// Label used in structured logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::Transport(_) | ChainError::Disconnected | ChainError::Timeout { .. } => {
                "transport"
            }
            ChainError::Rpc(_) => "rpc",
            ChainError::Decode(_) => "decode",
            ChainError::NoAccount | ChainError::NoIndexes(_) => "configuration",
            ChainError::Abi(_) => "abi",
        }
    }

    /// Whether a fresh connection could make this error go away.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ChainError::NoAccount | ChainError::NoIndexes(_) | ChainError::Abi(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_share_a_kind() {
        assert_eq!(ChainError::Disconnected.kind(), "transport");
        assert_eq!(ChainError::Transport("reset".into()).kind(), "transport");
        assert_eq!(
            ChainError::Timeout {
                method: "eth_call".into()
            }
            .kind(),
            "transport"
        );
    }

    #[test]
    fn configuration_failures_are_not_recoverable() {
        assert!(!ChainError::NoAccount.is_recoverable());
        assert!(!ChainError::NoIndexes("not registered".into()).is_recoverable());
        assert!(ChainError::Disconnected.is_recoverable());
    }
}
