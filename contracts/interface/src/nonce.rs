//! Typed ERC-4337 nonces
//!
//! The 256-bit user-op nonce is `key (192 bits) || seq (64 bits)`. Daimo
//! packs a [`NonceMetadata`] into the low 72 bits of the key so that the
//! contract and any indexer can classify an operation without decoding its
//! call data:
//!
//! ```text
//! | unused (120) | type (8) | identifier (64) | seq (64) |
//! ```

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Operation class carried in the nonce key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NonceType {
    Transfer = 0,
    CreateNote = 1,
    ClaimNote = 2,
    AddKey = 3,
    RemoveKey = 4,
}

impl TryFrom<u8> for NonceType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NonceType::Transfer),
            1 => Ok(NonceType::CreateNote),
            2 => Ok(NonceType::ClaimNote),
            3 => Ok(NonceType::AddKey),
            4 => Ok(NonceType::RemoveKey),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NonceMetadata {
    pub nonce_type: NonceType,
    pub identifier: u64,
}

impl NonceMetadata {
    pub fn new(nonce_type: NonceType, identifier: u64) -> Self {
        Self {
            nonce_type,
            identifier,
        }
    }

    pub fn to_u128(&self) -> u128 {
        ((self.nonce_type as u128) << 64) | self.identifier as u128
    }

    pub fn from_u128(value: u128) -> Option<Self> {
        if value >> 72 != 0 {
            return None;
        }
        let nonce_type = NonceType::try_from((value >> 64) as u8).ok()?;
        Some(Self::new(nonce_type, value as u64))
    }
}

/// A full user-op nonce. Ordering is by metadata, then sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nonce {
    pub metadata: NonceMetadata,
    pub seq: u64,
}

impl Nonce {
    pub fn new(metadata: NonceMetadata) -> Self {
        Self { metadata, seq: 0 }
    }

    pub fn nonce_type(&self) -> NonceType {
        self.metadata.nonce_type
    }

    pub fn to_u256(&self) -> U256 {
        (U256::from(self.metadata.to_u128()) << 64) | U256::from(self.seq)
    }

    /// Inverse of [`Nonce::to_u256`]. Returns `None` for nonces that were
    /// not produced by a Daimo client.
    pub fn from_u256(value: U256) -> Option<Self> {
        let seq = value.as_limbs()[0];
        let key: U256 = value >> 64;
        if key >> 128 != U256::ZERO {
            return None;
        }
        let key: u128 = key.to();
        Some(Self {
            metadata: NonceMetadata::from_u128(key)?,
            seq,
        })
    }
}
