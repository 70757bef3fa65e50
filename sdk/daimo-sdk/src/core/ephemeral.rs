use alloy_primitives::{eip191_hash_message, keccak256, Address, Bytes, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

use crate::error::{DaimoSdkError, Result};
use crate::utils::k256_address;

/// One-time secp256k1 keypair backing a payment link.
///
/// Whoever holds the private key controls the escrowed funds. The key is
/// generated on device and only ever leaves it inside a link.
#[derive(Clone)]
pub struct EphemeralKey {
    key: SigningKey,
}

impl EphemeralKey {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        SigningKey::from_slice(bytes)
            .map(|key| Self { key })
            .map_err(|e| DaimoSdkError::InvalidKey(e.to_string()))
    }

    pub fn to_bytes(&self) -> B256 {
        B256::from_slice(&self.key.to_bytes())
    }

    /// The note's `ephemeralOwner`.
    pub fn address(&self) -> Address {
        k256_address(self.key.verifying_key())
    }

    /// Prove link possession to the notes contract: an EIP-191 signature
    /// over `keccak256(claimant)`, as `r || s || v`.
    pub fn sign_claim(&self, claimant: &Address) -> Result<Bytes> {
        let digest = claim_digest(claimant);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| DaimoSdkError::InvalidKey(e.to_string()))?;

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.to_bytes());
        out.push(recovery_id.to_byte() + 27);
        Ok(Bytes::from(out))
    }
}

impl PartialEq for EphemeralKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for EphemeralKey {}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub fn claim_digest(claimant: &Address) -> B256 {
    eip191_hash_message(keccak256(claimant))
}

/// Address that produced a claim signature for `claimant`, if well formed.
pub fn recover_claim_signer(claimant: &Address, signature: &[u8]) -> Option<Address> {
    if signature.len() != 65 {
        return None;
    }
    let sig = Signature::from_slice(&signature[..64]).ok()?;
    let recovery_id = RecoveryId::from_byte(signature[64].checked_sub(27)?)?;
    let key =
        VerifyingKey::recover_from_prehash(claim_digest(claimant).as_slice(), &sig, recovery_id)
            .ok()?;
    Some(k256_address(&key))
}
