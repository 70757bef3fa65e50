//! SDK configuration
//!
//! Loaded from TOML. Every section has defaults, so a file only needs the
//! values it overrides.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::constants::*;
use crate::core::custodian::PromptCopy;
use crate::error::{DaimoSdkError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub chain: ChainSettings,

    #[serde(default)]
    pub gas: GasSettings,

    #[serde(default)]
    pub submit: SubmitSettings,

    #[serde(default)]
    pub signing: SigningSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub entry_point: Address,
    /// Home coin (USDC)
    pub token: Address,
    pub token_decimals: u8,
    /// Ephemeral notes escrow. Deployment-specific, no default.
    pub notes_contract: Address,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            entry_point: DEFAULT_ENTRY_POINT,
            token: DEFAULT_TOKEN,
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            notes_contract: Address::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSettings {
    pub call_gas_limit: u64,
    pub verification_gas_limit: u64,
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            call_gas_limit: DEFAULT_CALL_GAS_LIMIT,
            verification_gas_limit: DEFAULT_VERIFICATION_GAS_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitSettings {
    /// Ceiling on the receipt wait after bundling
    pub receipt_timeout_ms: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for SubmitSettings {
    fn default() -> Self {
        Self {
            receipt_timeout_ms: DEFAULT_RECEIPT_TIMEOUT_MS,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
        }
    }
}

impl SubmitSettings {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    /// Custodian alias of the device key
    pub key_name: String,
    pub prompt_title: String,
    pub prompt_message: String,
    /// Signature lifetime in seconds; 0 disables expiry
    pub valid_for_secs: u64,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            key_name: DEFAULT_KEY_NAME.to_string(),
            prompt_title: "Authorize".to_string(),
            prompt_message: "Confirm this transaction".to_string(),
            valid_for_secs: 0,
        }
    }
}

impl SigningSettings {
    pub fn prompt(&self) -> PromptCopy {
        PromptCopy {
            title: self.prompt_title.clone(),
            message: self.prompt_message.clone(),
        }
    }
}

impl SdkConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| DaimoSdkError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DaimoSdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DaimoSdkError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let chain = &self.chain;
        for (name, addr) in [
            ("chain.entry_point", chain.entry_point),
            ("chain.token", chain.token),
            ("chain.notes_contract", chain.notes_contract),
        ] {
            if addr == Address::ZERO {
                return Err(DaimoSdkError::Config(format!("{} must be set", name)));
            }
        }

        let submit = &self.submit;
        if submit.receipt_timeout_ms == 0 {
            return Err(DaimoSdkError::Config(
                "submit.receipt_timeout_ms must be positive".to_string(),
            ));
        }
        if submit.receipt_poll_interval_ms == 0
            || submit.receipt_poll_interval_ms >= submit.receipt_timeout_ms
        {
            return Err(DaimoSdkError::Config(
                "submit.receipt_poll_interval_ms must be positive and below the timeout"
                    .to_string(),
            ));
        }

        if self.signing.key_name.is_empty() {
            return Err(DaimoSdkError::Config(
                "signing.key_name must be set".to_string(),
            ));
        }
        Ok(())
    }
}
