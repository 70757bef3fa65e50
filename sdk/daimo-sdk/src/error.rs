use alloy_primitives::{Address, B256};
use thiserror::Error;

use crate::core::custodian::CustodianError;

/// SDK-specific error types for Daimo operations
#[derive(Debug, Error)]
pub enum DaimoSdkError {
    /// The user dismissed the biometric / passcode prompt
    #[error("Authentication cancelled")]
    UserCancelled,

    /// The device signing key is gone; the account must be re-provisioned
    #[error("Signing key not found: {0}")]
    KeyNotFound(String),

    /// Key custodian failed for a reason other than cancellation
    #[error("Key custodian error: {0}")]
    Custodian(String),

    /// Bundler or RPC unreachable, or the request was rejected
    #[error("Connection error: {0}")]
    Connection(String),

    /// The bundler refused the nonce: an operation using it was already
    /// submitted
    #[error("Nonce rejected: {0}")]
    NonceRejected(String),

    /// Bundled, but no receipt arrived before the deadline. May still land.
    #[error("Bundle not found: {0}")]
    BundleNotFound(B256),

    /// Included on-chain and reverted
    #[error("Transaction reverted: {0}")]
    Reverted(B256),

    /// No note is escrowed for this ephemeral owner, most likely because it
    /// has been claimed
    #[error("Note already claimed: {0}")]
    AlreadyClaimed(Address),

    /// Link could not be parsed, or does not carry what the flow needs
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// Self-reclaim attempted by someone other than the note creator
    #[error("Only the creator can reclaim note {0}")]
    NotNoteCreator(Address),

    /// Malformed key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Local account state cannot support the requested operation
    #[error("Invalid account state: {0}")]
    InvalidAccountState(String),

    /// Operation could not be constructed
    #[error("Build error: {0}")]
    Build(String),

    /// Configuration missing or inconsistent
    #[error("Config error: {0}")]
    Config(String),

    #[error("Interface error: {0}")]
    Interface(#[from] daimo_interface::InterfaceError),
}

/// How the UI should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not a failure; offer "Retry" without alarming styling
    Cancelled,
    /// Device identity is broken; route to re-provisioning
    Fatal,
    /// Nothing reached the chain; safe to try again
    Retryable,
    /// Outcome unknown; chain sync will settle it
    Ambiguous,
    /// Definitive failure of this attempt
    Terminal,
}

impl DaimoSdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaimoSdkError::UserCancelled => ErrorKind::Cancelled,
            DaimoSdkError::KeyNotFound(_) | DaimoSdkError::Custodian(_) => ErrorKind::Fatal,
            DaimoSdkError::Connection(_) => ErrorKind::Retryable,
            DaimoSdkError::BundleNotFound(_) => ErrorKind::Ambiguous,
            _ => ErrorKind::Terminal,
        }
    }

    /// Classify a bundler rejection. `AA25` is the entry point's invalid
    /// nonce code; anything else is treated as a transport failure.
    pub fn from_bundler(message: String) -> Self {
        if message.contains("AA25") {
            DaimoSdkError::NonceRejected(message)
        } else {
            DaimoSdkError::Connection(message)
        }
    }

    /// Whether `exec()` may be re-issued on the same submitter. Only true
    /// for failures that happened before the operation reached the bundler.
    pub fn is_retryable_in_place(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Cancelled | ErrorKind::Retryable
        )
    }
}

impl From<CustodianError> for DaimoSdkError {
    fn from(e: CustodianError) -> Self {
        match e {
            CustodianError::UserCancelled => DaimoSdkError::UserCancelled,
            CustodianError::KeyNotFound(name) => DaimoSdkError::KeyNotFound(name),
            CustodianError::Failure(msg) => DaimoSdkError::Custodian(msg),
        }
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, DaimoSdkError>;
