//! Packed account signature
//!
//! ```text
//! | version (1) | validUntil (6, BE) | keySlot (1) | r (32) | s (32) |
//! ```

use alloy_primitives::{Bytes, B256};

use crate::error::InterfaceError;

pub const SIGNATURE_VERSION: u8 = 1;
pub const SIGNATURE_LEN: usize = 72;

/// Largest value representable in the 48-bit `validUntil` field.
pub const MAX_VALID_UNTIL: u64 = (1 << 48) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSignature {
    /// Unix seconds after which the signature is rejected. 0 disables expiry.
    pub valid_until: u64,
    pub key_slot: u8,
    pub r: B256,
    pub s: B256,
}

impl AccountSignature {
    pub fn encode(&self) -> Result<Bytes, InterfaceError> {
        if self.valid_until > MAX_VALID_UNTIL {
            return Err(InterfaceError::ValidUntilOverflow(self.valid_until));
        }

        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.push(SIGNATURE_VERSION);
        out.extend_from_slice(&self.valid_until.to_be_bytes()[2..]);
        out.push(self.key_slot);
        out.extend_from_slice(self.r.as_slice());
        out.extend_from_slice(self.s.as_slice());
        Ok(Bytes::from(out))
    }

    pub fn decode(data: &[u8]) -> Result<Self, InterfaceError> {
        if data.len() != SIGNATURE_LEN {
            return Err(InterfaceError::InvalidSignatureLength(data.len()));
        }
        if data[0] != SIGNATURE_VERSION {
            return Err(InterfaceError::UnsupportedSignatureVersion(data[0]));
        }

        let mut valid_until = [0u8; 8];
        valid_until[2..].copy_from_slice(&data[1..7]);

        Ok(Self {
            valid_until: u64::from_be_bytes(valid_until),
            key_slot: data[7],
            r: B256::from_slice(&data[8..40]),
            s: B256::from_slice(&data[40..72]),
        })
    }
}
