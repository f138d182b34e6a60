//! Network selection and chain parameters
//!
//! # Example
//!
//! ```
//! use spv_proof::config::{Network, SpvConfig};
//!
//! let config = SpvConfig::from_json_str(r#"{ "network": "regtest" }"#).unwrap();
//! assert_eq!(config.network, Network::Regtest);
//! assert!(config.params.no_retargeting);
//! ```

use crate::constants::{DIFFICULTY_ADJUSTMENT_INTERVAL, MAX_TARGET_BITS, REGTEST_TARGET_BITS, TARGET_TIME_PER_BLOCK};
use crate::error::{Result, SpvError};
use crate::pow::Target;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

/// Proof-of-work parameters that drive retargeting and header checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Compact form of the easiest allowed target
    pub pow_limit_bits: u32,
    /// Blocks per difficulty period
    pub retarget_interval: u64,
    /// Expected seconds between blocks
    pub target_spacing: u64,
    /// Keep the previous target across periods (regtest)
    pub no_retargeting: bool,
}

impl ChainParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet | Network::Testnet => ChainParams {
                pow_limit_bits: MAX_TARGET_BITS,
                retarget_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
                target_spacing: TARGET_TIME_PER_BLOCK,
                no_retargeting: false,
            },
            Network::Regtest => ChainParams {
                pow_limit_bits: REGTEST_TARGET_BITS,
                retarget_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
                target_spacing: TARGET_TIME_PER_BLOCK,
                no_retargeting: true,
            },
        }
    }

    /// Expected duration of one difficulty period, in seconds
    pub fn target_timespan(&self) -> u64 {
        self.retarget_interval * self.target_spacing
    }

    pub fn pow_limit(&self) -> Result<Target> {
        Target::from_compact(self.pow_limit_bits)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retarget_interval == 0 || self.target_spacing == 0 {
            return Err(SpvError::InvalidConfig(
                "retarget interval and target spacing must be non-zero".to_string(),
            ));
        }
        if self.target_timespan() > i64::MAX as u64 / 4 {
            return Err(SpvError::InvalidConfig("target timespan too large".to_string()));
        }
        let limit = self
            .pow_limit()
            .map_err(|e| SpvError::InvalidConfig(format!("pow limit: {}", e)))?;
        if limit.is_zero() {
            return Err(SpvError::InvalidConfig("pow limit is zero".to_string()));
        }
        Ok(())
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams::for_network(Network::Mainnet)
    }
}

/// Top-level configuration.
///
/// Every field is optional in JSON; `params` defaults to the mainnet values
/// unless the network is given and the params are not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpvConfig {
    pub network: Network,
    pub params: ChainParams,
    /// Require each confirming header to meet its own target
    pub check_header_work: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    network: Network,
    params: Option<ChainParams>,
    check_header_work: Option<bool>,
}

impl<'de> Deserialize<'de> for SpvConfig {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawConfig::deserialize(deserializer)?;
        Ok(SpvConfig {
            network: raw.network,
            params: raw.params.unwrap_or_else(|| ChainParams::for_network(raw.network)),
            check_header_work: raw.check_header_work.unwrap_or(true),
        })
    }
}

impl SpvConfig {
    pub fn for_network(network: Network) -> Self {
        SpvConfig {
            network,
            params: ChainParams::for_network(network),
            check_header_work: true,
        }
    }

    /// Regtest parameters with header work checks off, for hand-built fixtures
    pub fn for_testing() -> Self {
        SpvConfig {
            check_header_work: false,
            ..SpvConfig::for_network(Network::Regtest)
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: SpvConfig = serde_json::from_str(s)?;
        config.params.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for SpvConfig {
    fn default() -> Self {
        SpvConfig::for_network(Network::Mainnet)
    }
}
