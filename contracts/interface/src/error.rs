//! Daimo interface error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("Invalid signature length: {0}")]
    InvalidSignatureLength(usize),

    #[error("Unsupported signature version: {0}")]
    UnsupportedSignatureVersion(u8),

    #[error("validUntil does not fit in 48 bits: {0}")]
    ValidUntilOverflow(u64),
}
