//! Hex encodings used by the Ethereum JSON-RPC API

use ethabi::{Address, Hash};

use crate::error::ChainError;

fn strip_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Parse a `QUANTITY` such as `"0x1b4"`.
pub fn parse_quantity(value: &str) -> Result<u64, ChainError> {
    let digits = strip_prefix(value);
    if digits.is_empty() {
        return Err(ChainError::Decode(format!("empty quantity {value:?}")));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|err| ChainError::Decode(format!("quantity {value:?}: {err}")))
}

pub fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

pub fn parse_bytes(value: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(strip_prefix(value))
        .map_err(|err| ChainError::Decode(format!("data {value:?}: {err}")))
}

pub fn bytes(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

pub fn parse_address(value: &str) -> Result<Address, ChainError> {
    let raw = parse_bytes(value)?;
    if raw.len() != 20 {
        return Err(ChainError::Decode(format!(
            "address {value:?} has {} bytes",
            raw.len()
        )));
    }
    Ok(Address::from_slice(&raw))
}

pub fn address(value: &Address) -> String {
    bytes(value.as_bytes())
}

pub fn parse_hash(value: &str) -> Result<Hash, ChainError> {
    let raw = parse_bytes(value)?;
    if raw.len() != 32 {
        return Err(ChainError::Decode(format!(
            "hash {value:?} has {} bytes",
            raw.len()
        )));
    }
    Ok(Hash::from_slice(&raw))
}

pub fn hash(value: &Hash) -> String {
    bytes(value.as_bytes())
}
