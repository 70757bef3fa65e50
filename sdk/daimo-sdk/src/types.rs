use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// Purpose of a key slot. Each tier owns a contiguous range of indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotTier {
    /// Phone or computer holding a hardware key
    Device,
    /// Synced passkey kept as a backup
    PasskeyBackup,
    /// Roaming security key kept as a backup
    SecurityKeyBackup,
}

impl SlotTier {
    pub fn range(&self) -> Range<u8> {
        match self {
            SlotTier::Device => 0x00..0x40,
            SlotTier::PasskeyBackup => 0x40..0x80,
            SlotTier::SecurityKeyBackup => 0x80..0xC0,
        }
    }

    /// Tier owning `slot`, or `None` for the unassigned top range.
    pub fn of(slot: u8) -> Option<Self> {
        [
            SlotTier::Device,
            SlotTier::PasskeyBackup,
            SlotTier::SecurityKeyBackup,
        ]
        .into_iter()
        .find(|tier| tier.range().contains(&slot))
    }

    pub fn is_backup(&self) -> bool {
        !matches!(self, SlotTier::Device)
    }
}

/// A P-256 signing key registered on the account contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySlot {
    pub slot: u8,
    /// Uncompressed `(x, y)`
    pub pubkey: [B256; 2],
    /// Unix seconds of the confirming block, if known
    pub added_at: Option<u64>,
}

impl KeySlot {
    pub fn tier(&self) -> Option<SlotTier> {
        SlotTier::of(self.slot)
    }
}

/// Lowest index of `tier` not present in `used`.
pub fn find_unused_slot(used: impl IntoIterator<Item = u8>, tier: SlotTier) -> Option<u8> {
    let used: BTreeSet<u8> = used.into_iter().collect();
    tier.range().find(|slot| !used.contains(slot))
}

/// Fee parameters the bundler and paymaster currently accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainGasConstants {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub pre_verification_gas: U256,
    pub paymaster_and_data: Bytes,
    /// Fee the paymaster charges, in dollars
    pub estimated_fee_dollars: f64,
}

/// Projected cost of an operation, shown before commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    pub fee_dollars: f64,
    pub total_dollars: f64,
}

/// Emitted once a bundler includes the operation in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleEvent {
    pub transaction_hash: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub status: ReceiptStatus,
}

/// On-chain escrow record for an ephemeral note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub ephemeral_owner: Address,
    pub from: Address,
    pub amount: U256,
    pub memo: Option<String>,
}
