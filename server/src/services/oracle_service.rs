//! Supervises the oracle session: connect, resolve identity, listen, respond,
//! and reconnect with backoff after transport failures.

use std::sync::Arc;

use ethabi::Address;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::abi::OracleContract;
use crate::chain::{CallRequest, ChainConnector, ConnectorFactory, WsConnectorFactory};
use crate::config::{IndexSource, OracleConfig};
use crate::error::ChainError;
use crate::event_listener::{EventListener, StartPoint};
use crate::models::{LogPosition, OracleIndexSet};
use crate::services::responder::{OracleResponder, ResponderConfig};
use crate::services::stats::OracleStats;

const RECONNECT_MAX_BACKOFF_SECONDS: u64 = 30;

/// Reconnect delay after `failures` consecutive failed sessions.
pub fn reconnect_backoff(failures: u32) -> Duration {
    let seconds = 2u64
        .saturating_pow(failures.min(5))
        .min(RECONNECT_MAX_BACKOFF_SECONDS);
    Duration::from_secs(seconds)
}

pub struct OracleService {
    config: OracleConfig,
    connector_factory: Arc<dyn ConnectorFactory>,
    contract: OracleContract,
    stats: Arc<OracleStats>,
    indexes: Option<OracleIndexSet>,
    acknowledged: Option<LogPosition>,
}

impl OracleService {
    pub fn new(config: OracleConfig, contract: OracleContract, stats: Arc<OracleStats>) -> Self {
        let indexes = match &config.index_source {
            IndexSource::Static(indexes) => Some(indexes.clone()),
            IndexSource::Contract => None,
        };

        let connector_factory = Arc::new(WsConnectorFactory::new(
            config.rpc_url.clone(),
            config.rpc_timeout,
        ));

        Self {
            config,
            connector_factory,
            contract,
            stats,
            indexes,
            acknowledged: None,
        }
    }

    /// Replace how sessions obtain a node connection.
    pub fn with_connector_factory(mut self, factory: Arc<dyn ConnectorFactory>) -> Self {
        self.connector_factory = factory;
        self
    }

    /// Run until shutdown or an unrecoverable error, which is returned.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<(), ChainError> {
        let mut failures: u32 = 0;

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let connector = match self.connector_factory.connect().await {
                Ok(connector) => connector,
                Err(err) => {
                    self.stats.record_transport_error();
                    error!(error_kind = err.kind(), error = %err, "failed to connect to node");
                    failures = failures.saturating_add(1);
                    if !self.wait_before_reconnect(failures, shutdown.clone()).await {
                        break Ok(());
                    }
                    continue;
                }
            };

            self.stats.set_connected(true);
            if failures > 0 {
                self.stats.record_reconnect();
            }

            let resumed_from = self.acknowledged;
            match self.run_session(connector, shutdown.clone()).await {
                Ok(()) => {
                    info!("oracle service exited cleanly");
                    break Ok(());
                }
                Err(err) if !err.is_recoverable() => {
                    error!(error_kind = err.kind(), error = %err, "oracle service stopped");
                    break Err(err);
                }
                Err(err) => {
                    self.stats.record_transport_error();
                    error!(
                        error_kind = err.kind(),
                        error = %err,
                        resume_after = ?self.acknowledged,
                        "oracle session failed"
                    );
                    if self.acknowledged != resumed_from {
                        failures = 0;
                    }
                    failures = failures.saturating_add(1);
                    if !self.wait_before_reconnect(failures, shutdown.clone()).await {
                        break Ok(());
                    }
                }
            }
        };

        self.stats.set_connected(false);
        result
    }

    /// One connection's worth of work: resolve the oracle identity, open the
    /// request stream at the last acknowledged position and respond until the
    /// stream fails or shutdown is signalled.
    pub async fn run_session(
        &mut self,
        connector: Arc<dyn ChainConnector>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ChainError> {
        let account = self.resolve_account(connector.as_ref()).await?;
        let indexes = self.resolve_indexes(connector.as_ref(), account).await?;

        info!(account = ?account, indexes = %indexes, "Oracle identity resolved");

        let listener = EventListener::new(connector.clone(), self.contract.clone());
        let events = listener
            .open(StartPoint::resume(self.config.from_block, self.acknowledged))
            .await?;

        let mut responder = OracleResponder::new(
            ResponderConfig {
                connector,
                contract: self.contract.clone(),
                indexes,
                account,
                gas_limit: self.config.gas_limit,
                submit_retries: self.config.submit_retries,
            },
            self.stats.clone(),
        );

        responder.run(events, &mut self.acknowledged, shutdown).await
    }

    async fn resolve_account(&self, connector: &dyn ChainConnector) -> Result<Address, ChainError> {
        if let Some(account) = self.config.account {
            return Ok(account);
        }

        connector
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(ChainError::NoAccount)
    }

    async fn resolve_indexes(
        &mut self,
        connector: &dyn ChainConnector,
        account: Address,
    ) -> Result<OracleIndexSet, ChainError> {
        if let Some(indexes) = &self.indexes {
            return Ok(indexes.clone());
        }

        let output = connector
            .call(&CallRequest {
                from: Some(account),
                to: self.contract.address(),
                data: self.contract.encode_get_my_indexes()?,
            })
            .await
            .map_err(|err| match err {
                // FlightSuretyApp reverts for accounts that never registered.
                ChainError::Rpc(rpc) => ChainError::NoIndexes(rpc.message),
                other => other,
            })?;
        let indexes = OracleIndexSet::new(self.contract.decode_my_indexes(&output)?);
        if indexes.is_empty() {
            return Err(ChainError::NoIndexes("getMyIndexes returned none".to_string()));
        }

        info!(indexes = %indexes, "Fetched oracle indexes from contract");
        self.indexes = Some(indexes.clone());
        Ok(indexes)
    }

    /// Sleep out the backoff. Returns `false` when shutdown arrived meanwhile.
    async fn wait_before_reconnect(
        &self,
        failures: u32,
        mut shutdown: watch::Receiver<bool>,
    ) -> bool {
        let backoff = reconnect_backoff(failures);
        warn!(failures, backoff_seconds = backoff.as_secs(), "oracle reconnect backoff");

        tokio::select! {
            _ = sleep(backoff) => true,
            _ = shutdown.changed() => false,
        }
    }

    pub fn acknowledged(&self) -> Option<LogPosition> {
        self.acknowledged
    }
}
