pub mod account;
pub mod advanced;
pub mod basic;
pub mod config;
pub mod core;
pub mod error;
pub mod link;
pub mod types;
pub mod utils;

pub use crate::account::{Account, EntryId, OpEvent, OpStatus, SyncUpdate, TransferEntry};
pub use crate::basic::actions::{ClaimAuth, Intent, OperationBuilder};
pub use crate::basic::note::{ClaimOutcome, NoteStatus};
pub use crate::basic::wallet::{DaimoWallet, SyncOutcome, WalletSubmitter};
pub use crate::config::SdkConfig;
pub use crate::core::connection::BundlerConnection;
pub use crate::core::custodian::{KeyCustodian, MemoryKeyCustodian};
pub use crate::core::signer::{DeviceSigner, SigningCallback};
pub use crate::core::status::{ActStatus, Status};
pub use crate::core::submitter::{ExecOutcome, OperationSubmitter};
pub use crate::error::{DaimoSdkError, ErrorKind, Result};
pub use crate::link::{dispatch_deep_link, format_daimo_link, parse_daimo_link, DaimoLink, NoteLink};
pub use crate::types::{find_unused_slot, KeySlot, SlotTier};

pub mod interface {
    pub use daimo_interface::{Nonce, NonceMetadata, NonceType, UserOperation};
}
