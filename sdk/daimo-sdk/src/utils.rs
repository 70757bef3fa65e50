use alloy_primitives::{keccak256, Address, B256, U256};
use p256::pkcs8::DecodePublicKey;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{DaimoSdkError, Result};

//=============================================================================
// Key Helpers
//=============================================================================

/// Ethereum address of a secp256k1 public key.
pub fn k256_address(key: &k256::ecdsa::VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Split a DER SubjectPublicKeyInfo P-256 key into the `(x, y)` words the
/// account contract stores.
pub fn p256_key_words(der: &[u8]) -> Result<[B256; 2]> {
    let key = p256::ecdsa::VerifyingKey::from_public_key_der(der)
        .map_err(|e| DaimoSdkError::InvalidKey(e.to_string()))?;
    let point = key.to_encoded_point(false);

    match (point.x(), point.y()) {
        (Some(x), Some(y)) => Ok([B256::from_slice(x), B256::from_slice(y)]),
        _ => Err(DaimoSdkError::InvalidKey(
            "public key is the identity point".to_string(),
        )),
    }
}

//=============================================================================
// Amounts
//=============================================================================

pub fn token_units_to_dollars(amount: U256, decimals: u8) -> f64 {
    let units = u128::try_from(amount).unwrap_or(u128::MAX);
    units as f64 / 10f64.powi(decimals as i32)
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
