//! Shared test doubles for the oracle integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethabi::{Address, Hash, Token, Uint};
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use flightsurety_oracle::abi::OracleContract;
use flightsurety_oracle::chain::{
    CallRequest, ChainConnector, ConnectorFactory, LogEntry, LogFilter, LogStream,
    SubmissionOutcome, TransactionRequest,
};
use flightsurety_oracle::error::{ChainError, RpcError};
use flightsurety_oracle::models::{LogPosition, OracleRequestEvent};

pub fn contract_address() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn oracle_account() -> Address {
    Address::repeat_byte(0x0e)
}

pub fn airline() -> Address {
    Address::repeat_byte(0x0a)
}

pub fn contract() -> OracleContract {
    OracleContract::flight_surety(contract_address()).unwrap()
}

pub fn position(block_number: u64, log_index: u64) -> LogPosition {
    LogPosition {
        block_number,
        log_index,
    }
}

pub fn request(index: u8, flight: &str, timestamp: u64, at: LogPosition) -> OracleRequestEvent {
    OracleRequestEvent {
        index,
        airline: airline(),
        flight: flight.to_string(),
        timestamp: Uint::from(timestamp),
        position: at,
        transaction_hash: None,
    }
}

/// `OracleRequest` log as the node would report it.
pub fn request_log(index: u8, flight: &str, timestamp: u64, at: LogPosition) -> LogEntry {
    let contract = contract();
    LogEntry {
        address: contract.address(),
        topics: vec![contract.log_filter().topic],
        data: ethabi::encode(&[
            Token::Uint(Uint::from(index)),
            Token::Address(airline()),
            Token::String(flight.to_string()),
            Token::Uint(Uint::from(timestamp)),
        ]),
        position: at,
        transaction_hash: Some(Hash::from_low_u64_be(at.block_number)),
        removed: false,
    }
}

pub fn accepted(n: u64) -> SubmissionOutcome {
    SubmissionOutcome::Accepted {
        tx_hash: Hash::from_low_u64_be(n),
    }
}

/// In-memory node: scripted outcomes, recorded transactions, a backlog and a
/// live log channel fed by the test.
pub struct MockConnector {
    sent: Mutex<Vec<TransactionRequest>>,
    outcomes: Mutex<VecDeque<SubmissionOutcome>>,
    backlog: Mutex<Vec<LogEntry>>,
    backlog_queries: Mutex<Vec<u64>>,
    live: Mutex<Option<mpsc::UnboundedReceiver<Result<LogEntry, ChainError>>>>,
    live_tx: mpsc::UnboundedSender<Result<LogEntry, ChainError>>,
    accounts: Vec<Address>,
    call_output: Mutex<Option<Result<Vec<u8>, RpcError>>>,
    calls: Mutex<Vec<CallRequest>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Self::with_accounts(vec![oracle_account()])
    }

    pub fn with_accounts(accounts: Vec<Address>) -> Arc<Self> {
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            backlog: Mutex::new(Vec::new()),
            backlog_queries: Mutex::new(Vec::new()),
            live: Mutex::new(Some(live_rx)),
            live_tx,
            accounts,
            call_output: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Outcomes returned by successive submissions; accepted once exhausted.
    pub fn script(&self, outcomes: impl IntoIterator<Item = SubmissionOutcome>) {
        self.outcomes.lock().unwrap().extend(outcomes);
    }

    pub fn set_backlog(&self, logs: Vec<LogEntry>) {
        *self.backlog.lock().unwrap() = logs;
    }

    pub fn push_live(&self, item: Result<LogEntry, ChainError>) {
        self.live_tx.send(item).unwrap();
    }

    pub fn set_call_output(&self, output: Vec<u8>) {
        *self.call_output.lock().unwrap() = Some(Ok(output));
    }

    /// Make `eth_call` fail the way a reverting contract does.
    pub fn set_call_error(&self, code: i64, message: &str) {
        *self.call_output.lock().unwrap() = Some(Err(RpcError {
            code,
            message: message.to_string(),
        }));
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn backlog_queries(&self) -> Vec<u64> {
        self.backlog_queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainConnector for MockConnector {
    async fn subscribe_logs(&self, _filter: &LogFilter) -> Result<LogStream, ChainError> {
        let receiver = self
            .live
            .lock()
            .unwrap()
            .take()
            .ok_or(ChainError::Disconnected)?;

        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        })
        .boxed())
    }

    async fn get_logs(
        &self,
        _filter: &LogFilter,
        from_block: u64,
    ) -> Result<Vec<LogEntry>, ChainError> {
        self.backlog_queries.lock().unwrap().push(from_block);
        Ok(self
            .backlog
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.position.block_number >= from_block)
            .cloned()
            .collect())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        Ok(self.accounts.clone())
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.call_output.lock().unwrap().clone() {
            Some(Ok(output)) => Ok(output),
            Some(Err(err)) => Err(ChainError::Rpc(err)),
            None => Err(ChainError::Decode("no call output scripted".to_string())),
        }
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> SubmissionOutcome {
        let mut sent = self.sent.lock().unwrap();
        sent.push(request.clone());
        let n = sent.len() as u64;
        drop(sent);

        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| accepted(n))
    }
}

/// Hands out one prepared node per session, then refuses to connect.
pub struct SequenceFactory {
    nodes: Mutex<VecDeque<Arc<MockConnector>>>,
}

impl SequenceFactory {
    pub fn new(nodes: Vec<Arc<MockConnector>>) -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(nodes.into()),
        })
    }
}

#[async_trait]
impl ConnectorFactory for SequenceFactory {
    async fn connect(&self) -> Result<Arc<dyn ChainConnector>, ChainError> {
        match self.nodes.lock().unwrap().pop_front() {
            Some(node) => Ok(node as Arc<dyn ChainConnector>),
            None => Err(ChainError::Transport("connection refused".to_string())),
        }
    }
}
