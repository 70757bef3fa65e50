//! On-chain call interface shared by the Daimo client and indexers.

pub mod calls;
pub mod error;
pub mod nonce;
pub mod signature;
pub mod user_op;

pub use crate::calls::{Call, IDaimoAccount, IERC20, IEphemeralNotes, SELF_RECLAIM_SIGNATURE};
pub use crate::error::InterfaceError;
pub use crate::nonce::{Nonce, NonceMetadata, NonceType};
pub use crate::signature::AccountSignature;
pub use crate::user_op::UserOperation;
