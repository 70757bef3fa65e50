use alloy_primitives::{address, Address};

/// Base mainnet
pub const DEFAULT_CHAIN_ID: u64 = 8453;

/// ERC-4337 v0.6 EntryPoint
pub const DEFAULT_ENTRY_POINT: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// USDC on Base
pub const DEFAULT_TOKEN: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

pub const DEFAULT_CALL_GAS_LIMIT: u64 = 300_000;
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 700_000;

pub const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 500;

pub const DEFAULT_KEY_NAME: &str = "daimo-device-key";
