use std::path::PathBuf;

use ethabi::Address;

use super::Lookup;
use crate::chain::codec;
use crate::error::ConfigError;

/// Address and ABI location of one deployed contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractConfig {
    pub address: Address,
    /// `None` selects the bundled FlightSuretyApp ABI.
    pub abi_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractsConfig {
    pub app: ContractConfig,
    /// Separate oracle contract, when the deployment splits oracle handling
    /// out of FlightSuretyApp.
    pub oracle: Option<ContractConfig>,
}

impl ContractsConfig {
    pub(super) fn from_lookup(
        lookup: &Lookup<'_>,
        file_app_address: Option<String>,
    ) -> Result<Self, ConfigError> {
        let app_address = lookup("APP_CONTRACT_ADDRESS")
            .or(file_app_address)
            .ok_or(ConfigError::Missing("APP_CONTRACT_ADDRESS"))?;

        let app = ContractConfig {
            address: parse_address("APP_CONTRACT_ADDRESS", &app_address)?,
            abi_path: lookup("APP_CONTRACT_ABI").map(PathBuf::from),
        };

        let oracle = lookup("ORACLE_CONTRACT_ADDRESS")
            .filter(|value| !value.trim().is_empty())
            .map(|address| -> Result<ContractConfig, ConfigError> {
                Ok(ContractConfig {
                    address: parse_address("ORACLE_CONTRACT_ADDRESS", &address)?,
                    abi_path: lookup("ORACLE_CONTRACT_ABI").map(PathBuf::from),
                })
            })
            .transpose()?;

        Ok(Self { app, oracle })
    }

    /// Contract whose `OracleRequest` events are answered.
    pub fn responder_contract(&self) -> &ContractConfig {
        self.oracle.as_ref().unwrap_or(&self.app)
    }
}

fn parse_address(key: &'static str, value: &str) -> Result<Address, ConfigError> {
    codec::parse_address(value.trim()).map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
    })
}
