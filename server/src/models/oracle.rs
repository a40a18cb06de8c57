use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use ethabi::{Address, Hash, Uint};
use serde::Serialize;

/// Highest status code an oracle may report.
pub const MAX_STATUS_CODE: u8 = 5;

/// Position of a log in the chain. Orders deliveries and acts as the
/// acknowledgment checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// `OracleRequest(uint8 index, address airline, string flight, uint256 timestamp)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequestEvent {
    pub index: u8,
    pub airline: Address,
    pub flight: String,
    pub timestamp: Uint,
    pub position: LogPosition,
    pub transaction_hash: Option<Hash>,
}

/// Arguments of one `submitOracleResponse` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResponse {
    pub index: u8,
    pub airline: Address,
    pub flight: String,
    pub timestamp: Uint,
    pub status_code: u8,
}

impl OracleResponse {
    pub fn for_request(index: u8, request: &OracleRequestEvent, status_code: u8) -> Self {
        Self {
            index,
            airline: request.airline,
            flight: request.flight.clone(),
            timestamp: request.timestamp,
            status_code,
        }
    }
}

/// Indexes assigned to this oracle. Fixed for the lifetime of the process.
///
/// Duplicates are kept: every copy of an index produces its own submission,
/// which mirrors how the contract-side loop treats them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleIndexSet(Vec<u8>);

impl OracleIndexSet {
    pub fn new(indexes: Vec<u8>) -> Self {
        let set = Self(indexes);
        if set.has_duplicates() {
            tracing::warn!(indexes = ?set.0, "oracle index set contains duplicates");
        }
        set
    }

    /// Every assigned index equal to `index`, once per occurrence.
    pub fn matching(&self, index: u8) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied().filter(move |assigned| *assigned == index)
    }

    pub fn has_duplicates(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.0.len());
        self.0.iter().any(|index| !seen.insert(*index))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for OracleIndexSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let indexes = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u8>()
                    .map_err(|err| format!("index {part:?}: {err}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if indexes.is_empty() {
            return Err("no indexes given".to_string());
        }

        Ok(Self::new(indexes))
    }
}

impl fmt::Display for OracleIndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}
