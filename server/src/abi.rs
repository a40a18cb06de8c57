//! Contract ABI handling for the oracle's side of FlightSurety
//!
//! Accepts either a Truffle build artifact (`{"abi": [...]}`) or a bare ABI
//! array. When no file is configured the bundled FlightSuretyApp ABI is used.

use std::sync::Arc;

use ethabi::{Address, Contract, Event, Function, RawLog, Token, Uint};
use serde_json::Value;

use crate::chain::{LogEntry, LogFilter};
use crate::config::contracts::ContractConfig;
use crate::error::{AbiError, ConfigError};
use crate::models::{OracleRequestEvent, OracleResponse};

pub const FLIGHT_SURETY_APP_ABI: &str = include_str!("../abi/FlightSuretyApp.json");

const REQUEST_EVENT: &str = "OracleRequest";
const SUBMIT_FUNCTION: &str = "submitOracleResponse";
const INDEXES_FUNCTION: &str = "getMyIndexes";

/// The contract oracles listen to and answer.
#[derive(Debug, Clone)]
pub struct OracleContract {
    address: Address,
    abi: Arc<Contract>,
    request_event: Event,
    submit_function: Function,
}

impl OracleContract {
    pub fn new(address: Address, abi: Contract) -> Result<Self, AbiError> {
        let event = abi
            .event(REQUEST_EVENT)
            .map_err(|_| AbiError::MissingItem("event OracleRequest"))?
            .clone();
        if event.inputs.len() != 4 {
            return Err(AbiError::Malformed(format!(
                "OracleRequest has {} inputs, expected 4",
                event.inputs.len()
            )));
        }

        let submit = abi
            .function(SUBMIT_FUNCTION)
            .map_err(|_| AbiError::MissingItem("function submitOracleResponse"))?
            .clone();
        if submit.inputs.len() != 5 {
            return Err(AbiError::Malformed(format!(
                "submitOracleResponse has {} inputs, expected 5",
                submit.inputs.len()
            )));
        }

        Ok(Self {
            address,
            abi: Arc::new(abi),
            request_event: event,
            submit_function: submit,
        })
    }

    pub fn from_json(address: Address, json: &str) -> Result<Self, AbiError> {
        Self::new(address, parse_abi(json)?)
    }

    /// Bundled FlightSuretyApp ABI at `address`.
    pub fn flight_surety(address: Address) -> Result<Self, AbiError> {
        Self::from_json(address, FLIGHT_SURETY_APP_ABI)
    }

    pub fn load(config: &ContractConfig) -> Result<Self, ConfigError> {
        let contract = match &config.abi_path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_json(config.address, &json)?
            }
            None => Self::flight_surety(config.address)?,
        };

        tracing::info!(
            address = ?config.address,
            abi = %config
                .abi_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "bundled".to_string()),
            "Loaded oracle contract ABI"
        );

        Ok(contract)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Filter matching `OracleRequest` logs emitted by this contract.
    pub fn log_filter(&self) -> LogFilter {
        LogFilter {
            address: self.address,
            topic: self.request_event.signature(),
        }
    }

    pub fn decode_request(&self, log: &LogEntry) -> Result<OracleRequestEvent, AbiError> {
        let parsed = self
            .request_event
            .parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.clone(),
            })
            .map_err(|err| AbiError::Decode {
                what: "OracleRequest",
                reason: err.to_string(),
            })?;

        let mut index = None;
        let mut airline = None;
        let mut flight = None;
        let mut timestamp = None;
        for param in parsed.params {
            match param.name.as_str() {
                "index" => index = param.value.into_uint(),
                "airline" => airline = param.value.into_address(),
                "flight" => flight = param.value.into_string(),
                "timestamp" => timestamp = param.value.into_uint(),
                _ => {}
            }
        }

        let missing = |field: &str| AbiError::Decode {
            what: "OracleRequest",
            reason: format!("missing or mistyped {field}"),
        };

        Ok(OracleRequestEvent {
            index: uint_to_u8(index.ok_or_else(|| missing("index"))?, "OracleRequest")?,
            airline: airline.ok_or_else(|| missing("airline"))?,
            flight: flight.ok_or_else(|| missing("flight"))?,
            timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
            position: log.position,
            transaction_hash: log.transaction_hash,
        })
    }

    pub fn encode_response(&self, response: &OracleResponse) -> Result<Vec<u8>, AbiError> {
        self.submit_function
            .encode_input(&[
                Token::Uint(Uint::from(response.index)),
                Token::Address(response.airline),
                Token::String(response.flight.clone()),
                Token::Uint(response.timestamp),
                Token::Uint(Uint::from(response.status_code)),
            ])
            .map_err(|err| AbiError::Encode {
                what: "submitOracleResponse",
                reason: err.to_string(),
            })
    }

    /// Inverse of [`encode_response`](Self::encode_response), selector included.
    pub fn decode_response(&self, data: &[u8]) -> Result<OracleResponse, AbiError> {
        let function = &self.submit_function;
        let decode_err = |reason: String| AbiError::Decode {
            what: "submitOracleResponse",
            reason,
        };

        if data.len() < 4 || data[..4] != function.short_signature() {
            return Err(decode_err("selector mismatch".to_string()));
        }

        let mut tokens = function
            .decode_input(&data[4..])
            .map_err(|err| decode_err(err.to_string()))?
            .into_iter();

        let mut next = || tokens.next().ok_or_else(|| decode_err("too few arguments".into()));
        let index = next()?.into_uint();
        let airline = next()?.into_address();
        let flight = next()?.into_string();
        let timestamp = next()?.into_uint();
        let status_code = next()?.into_uint();

        match (index, airline, flight, timestamp, status_code) {
            (Some(index), Some(airline), Some(flight), Some(timestamp), Some(status_code)) => {
                Ok(OracleResponse {
                    index: uint_to_u8(index, "submitOracleResponse")?,
                    airline,
                    flight,
                    timestamp,
                    status_code: uint_to_u8(status_code, "submitOracleResponse")?,
                })
            }
            _ => Err(decode_err("mistyped arguments".to_string())),
        }
    }

    pub fn encode_get_my_indexes(&self) -> Result<Vec<u8>, AbiError> {
        self.indexes_function()?
            .encode_input(&[])
            .map_err(|err| AbiError::Encode {
                what: "getMyIndexes",
                reason: err.to_string(),
            })
    }

    pub fn decode_my_indexes(&self, output: &[u8]) -> Result<Vec<u8>, AbiError> {
        let decode_err = |reason: String| AbiError::Decode {
            what: "getMyIndexes",
            reason,
        };

        let tokens = self
            .indexes_function()?
            .decode_output(output)
            .map_err(|err| decode_err(err.to_string()))?;

        let values = match tokens.into_iter().next() {
            Some(Token::FixedArray(values)) | Some(Token::Array(values)) => values,
            other => return Err(decode_err(format!("unexpected output {other:?}"))),
        };

        values
            .into_iter()
            .map(|value| {
                value
                    .into_uint()
                    .ok_or_else(|| decode_err("non-integer index".to_string()))
                    .and_then(|index| uint_to_u8(index, "getMyIndexes"))
            })
            .collect()
    }

    fn indexes_function(&self) -> Result<&Function, AbiError> {
        self.abi
            .function(INDEXES_FUNCTION)
            .map_err(|_| AbiError::MissingItem("function getMyIndexes"))
    }
}

fn parse_abi(json: &str) -> Result<Contract, AbiError> {
    let document: Value =
        serde_json::from_str(json).map_err(|err| AbiError::Malformed(err.to_string()))?;

    let abi = match document {
        Value::Object(mut artifact) => artifact
            .remove("abi")
            .ok_or_else(|| AbiError::Malformed("artifact has no abi field".to_string()))?,
        array @ Value::Array(_) => array,
        _ => {
            return Err(AbiError::Malformed(
                "expected an ABI array or a build artifact".to_string(),
            ))
        }
    };

    serde_json::from_value(abi).map_err(|err| AbiError::Malformed(err.to_string()))
}

fn uint_to_u8(value: Uint, what: &'static str) -> Result<u8, AbiError> {
    if value.bits() > 8 {
        return Err(AbiError::Decode {
            what,
            reason: format!("{value} does not fit in uint8"),
        });
    }
    Ok(value.low_u32() as u8)
}
