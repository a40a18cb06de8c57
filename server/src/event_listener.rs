//! Event listener for `OracleRequest` logs
//!
//! Produces the ordered stream of requests the responder consumes: the
//! backlog from a starting block followed by live notifications, with
//! anything at or before the acknowledged position filtered out.

use std::sync::Arc;

use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::abi::OracleContract;
use crate::chain::{ChainConnector, LogEntry};
use crate::error::ChainError;
use crate::models::{LogPosition, OracleRequestEvent};

/// Decoded `OracleRequest` deliveries. Items are only `Err` for transport
/// failures; undecodable logs are skipped.
pub type EventStream = BoxStream<'static, Result<OracleRequestEvent, ChainError>>;

/// Where a subscription starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPoint {
    /// Replay everything from this block.
    Block(u64),
    /// Resume after the last acknowledged delivery.
    After(LogPosition),
}

impl StartPoint {
    pub fn resume(from_block: u64, acknowledged: Option<LogPosition>) -> Self {
        match acknowledged {
            Some(position) => StartPoint::After(position),
            None => StartPoint::Block(from_block),
        }
    }

    fn first_block(&self) -> u64 {
        match self {
            StartPoint::Block(block) => *block,
            StartPoint::After(position) => position.block_number,
        }
    }

    fn last_seen(&self) -> Option<LogPosition> {
        match self {
            StartPoint::Block(_) => None,
            StartPoint::After(position) => Some(*position),
        }
    }
}

pub struct EventListener {
    connector: Arc<dyn ChainConnector>,
    contract: OracleContract,
}

impl EventListener {
    pub fn new(connector: Arc<dyn ChainConnector>, contract: OracleContract) -> Self {
        Self {
            connector,
            contract,
        }
    }

    /// Open the request stream.
    ///
    /// The live subscription is opened before the backlog query so nothing
    /// mined in between is missed; the overlap is removed by position.
    pub async fn open(&self, start: StartPoint) -> Result<EventStream, ChainError> {
        let filter = self.contract.log_filter();

        let live = self.connector.subscribe_logs(&filter).await?;
        let backlog = self
            .connector
            .get_logs(&filter, start.first_block())
            .await?;

        tracing::info!(
            contract = ?self.contract.address(),
            from_block = start.first_block(),
            backlog = backlog.len(),
            "Listening for OracleRequest events"
        );

        let contract = self.contract.clone();
        let mut last_seen = start.last_seen();

        let events = stream::iter(backlog.into_iter().map(Ok))
            .chain(live)
            .filter_map(move |item| {
                let delivery = match item {
                    Ok(log) => accept(&contract, &mut last_seen, log).map(Ok),
                    Err(err) => Some(Err(err)),
                };
                future::ready(delivery)
            });

        Ok(events.boxed())
    }
}

fn accept(
    contract: &OracleContract,
    last_seen: &mut Option<LogPosition>,
    log: LogEntry,
) -> Option<OracleRequestEvent> {
    if log.removed {
        tracing::debug!(position = %log.position, "ignoring removed log");
        return None;
    }

    if last_seen.map_or(false, |seen| log.position <= seen) {
        return None;
    }
    *last_seen = Some(log.position);

    match contract.decode_request(&log) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(position = %log.position, error = %err, "skipping undecodable OracleRequest log");
            None
        }
    }
}
