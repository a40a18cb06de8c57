//! JSON-RPC over WebSocket
//!
//! Thin adapter from [`ChainConnector`] onto `jsonrpsee`'s WebSocket client,
//! which owns request ids, timeouts, `eth_subscription` routing and keepalive
//! pings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethabi::Address;
use futures_util::StreamExt;
use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::core::ClientError;
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{PingConfig, WsClient, WsClientBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    codec, CallRequest, ChainConnector, ConnectorFactory, LogEntry, LogFilter, LogStream,
    SubmissionOutcome, TransactionRequest,
};
use crate::error::{ChainError, RpcError};

const PING_INTERVAL: Duration = Duration::from_secs(15);
/// A peer silent for this long is treated as gone.
const INACTIVE_LIMIT: Duration = Duration::from_secs(45);

pub struct WsConnector {
    client: WsClient,
}

impl WsConnector {
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, ChainError> {
        let client = WsClientBuilder::default()
            .request_timeout(request_timeout)
            .connection_timeout(request_timeout)
            .enable_ws_ping(
                PingConfig::new()
                    .ping_interval(PING_INTERVAL)
                    .inactive_limit(INACTIVE_LIMIT),
            )
            .build(url)
            .await
            .map_err(|err| ChainError::Transport(format!("connect {url}: {err}")))?;

        info!("Connected to node at {}", url);

        Ok(Self { client })
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: ArrayParams,
    ) -> Result<R, ChainError> {
        self.client
            .request(method, params)
            .await
            .map_err(|err| chain_error(method, err))
    }
}

fn chain_error(method: &str, err: ClientError) -> ChainError {
    match err {
        ClientError::Call(err) => ChainError::Rpc(RpcError {
            code: i64::from(err.code()),
            message: err.message().to_string(),
        }),
        ClientError::RequestTimeout => ChainError::Timeout {
            method: method.to_string(),
        },
        ClientError::RestartNeeded(_) => ChainError::Disconnected,
        ClientError::ParseError(err) => ChainError::Decode(format!("{method}: {err}")),
        other => ChainError::Transport(format!("{method}: {other}")),
    }
}

fn parse_logs(value: Value) -> Result<Vec<LogEntry>, ChainError> {
    let Value::Array(entries) = value else {
        return Err(ChainError::Decode(format!(
            "eth_getLogs returned a non-array result: {value}"
        )));
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match LogEntry::from_json(entry) {
            Ok(log) => Some(log),
            Err(err) => {
                warn!(error = %err, "skipping malformed log");
                None
            }
        })
        .collect())
}

#[async_trait]
impl ChainConnector for WsConnector {
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogStream, ChainError> {
        let subscription: Subscription<Value> = self
            .client
            .subscribe(
                "eth_subscribe",
                rpc_params!["logs", filter.to_json()],
                "eth_unsubscribe",
            )
            .await
            .map_err(|err| chain_error("eth_subscribe", err))?;

        debug!("subscribed to logs");

        // The subscription ends when the connection drops; the responder
        // treats the end of the stream as a lost connection.
        let logs = subscription.filter_map(|item| async move {
            match item.map_err(|err| ChainError::Decode(err.to_string())) {
                Ok(value) => match LogEntry::from_json(value) {
                    Ok(log) => Some(Ok(log)),
                    Err(err) => {
                        warn!(error = %err, "skipping malformed log notification");
                        None
                    }
                },
                Err(err) => {
                    warn!(error = %err, "skipping undecodable notification");
                    None
                }
            }
        });

        Ok(logs.boxed())
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
    ) -> Result<Vec<LogEntry>, ChainError> {
        let mut query = filter.to_json();
        query["fromBlock"] = Value::String(codec::quantity(from_block));
        query["toBlock"] = Value::String("latest".to_string());

        let result: Value = self.request("eth_getLogs", rpc_params![query]).await?;
        parse_logs(result)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        let accounts: Vec<String> = self.request("eth_accounts", rpc_params![]).await?;

        accounts
            .iter()
            .map(|account| codec::parse_address(account))
            .collect()
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError> {
        let data: String = self
            .request("eth_call", rpc_params![request.to_json(), "latest"])
            .await?;
        codec::parse_bytes(&data)
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> SubmissionOutcome {
        if !self.client.is_connected() {
            return SubmissionOutcome::NotSent {
                reason: "connection closed".to_string(),
            };
        }

        match self
            .request::<Value>("eth_sendTransaction", rpc_params![request.to_json()])
            .await
        {
            Ok(result) => match result.as_str().map(codec::parse_hash) {
                Some(Ok(tx_hash)) => SubmissionOutcome::Accepted { tx_hash },
                _ => SubmissionOutcome::Unknown {
                    reason: format!("unexpected transaction hash {result}"),
                },
            },
            Err(ChainError::Rpc(error)) => SubmissionOutcome::from_rpc_error(&error),
            // The client had already lost its connection; the request is
            // redelivered after reconnecting.
            Err(ChainError::Disconnected) => SubmissionOutcome::NotSent {
                reason: ChainError::Disconnected.to_string(),
            },
            Err(err) => SubmissionOutcome::Unknown {
                reason: err.to_string(),
            },
        }
    }
}

/// Opens a fresh [`WsConnector`] for every session.
pub struct WsConnectorFactory {
    url: String,
    request_timeout: Duration,
}

impl WsConnectorFactory {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl ConnectorFactory for WsConnectorFactory {
    async fn connect(&self) -> Result<Arc<dyn ChainConnector>, ChainError> {
        let connector = WsConnector::connect(&self.url, self.request_timeout).await?;
        Ok(Arc::new(connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObjectOwned;
    use serde_json::json;

    #[test]
    fn node_errors_keep_code_and_message() {
        let err = chain_error(
            "eth_sendTransaction",
            ClientError::Call(ErrorObjectOwned::owned(-32000, "nonce too low", None::<()>)),
        );

        match err {
            ChainError::Rpc(rpc) => {
                assert_eq!(rpc.code, -32000);
                assert_eq!(rpc.message, "nonce too low");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn timeouts_name_the_method() {
        let err = chain_error("eth_getLogs", ClientError::RequestTimeout);
        assert!(matches!(err, ChainError::Timeout { method } if method == "eth_getLogs"));
    }

    #[test]
    fn non_array_log_results_fail_the_query() {
        let err = parse_logs(json!({"error": "pruned"})).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let logs = parse_logs(json!([
            {"address": "0x01"},
            {
                "address": "0x00000000000000000000000000000000000000aa",
                "topics": [],
                "data": "0x",
                "blockNumber": "0x1",
                "logIndex": "0x0"
            }
        ]))
        .unwrap();

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].position.block_number, 1);
    }
}
