//! Local view of the on-chain account
//!
//! History is a two-tier store: a pending overlay of operations this device
//! signed, keyed by nonce, and an authoritative table filled by chain sync.
//! Merging is idempotent and independent of arrival order.

use alloy_primitives::{Address, B256, U256};
use daimo_interface::Nonce;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::types::KeySlot;

/// What an operation did, for history rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OpEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: U256,
    },
    CreateNote {
        from: Address,
        ephemeral_owner: Address,
        amount: U256,
    },
    ClaimNote {
        ephemeral_owner: Address,
        /// Note creator
        from: Address,
        /// Claimant
        to: Address,
        amount: U256,
    },
    AddKey {
        slot: u8,
    },
    RemoveKey {
        slot: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Pending,
    Confirmed,
    Finalized,
    Failed,
}

impl OpStatus {
    /// Later stages win when two observations of the same entry merge.
    fn rank(&self) -> u8 {
        match self {
            OpStatus::Pending => 0,
            OpStatus::Failed => 1,
            OpStatus::Confirmed => 2,
            OpStatus::Finalized => 3,
        }
    }
}

/// Identity of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryId {
    /// An operation sent by this account
    Op(Nonce),
    /// An event not originated by this account, e.g. an incoming transfer
    Log { tx_hash: B256, log_index: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEntry {
    pub id: EntryId,
    pub event: OpEvent,
    pub status: OpStatus,
    /// Unix seconds
    pub timestamp: u64,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
}

impl TransferEntry {
    pub fn nonce(&self) -> Option<Nonce> {
        match self.id {
            EntryId::Op(nonce) => Some(nonce),
            EntryId::Log { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferHistory {
    synced: BTreeMap<EntryId, TransferEntry>,
    pending: BTreeMap<Nonce, TransferEntry>,
}

impl TransferHistory {
    /// Add an optimistic entry. No-op if chain sync already reported the
    /// nonce, or if a pending entry for it exists.
    pub fn add_pending(&mut self, nonce: Nonce, event: OpEvent, timestamp: u64) -> bool {
        if self.synced.contains_key(&EntryId::Op(nonce)) || self.pending.contains_key(&nonce) {
            return false;
        }
        self.pending.insert(
            nonce,
            TransferEntry {
                id: EntryId::Op(nonce),
                event,
                status: OpStatus::Pending,
                timestamp,
                tx_hash: None,
                block_number: None,
            },
        );
        true
    }

    /// Update an entry still in the pending overlay.
    pub fn update_pending(&mut self, nonce: &Nonce, status: OpStatus, tx_hash: Option<B256>) {
        if let Some(entry) = self.pending.get_mut(nonce) {
            entry.status = status;
            if tx_hash.is_some() {
                entry.tx_hash = tx_hash;
            }
        }
    }

    pub fn remove_pending(&mut self, nonce: &Nonce) -> Option<TransferEntry> {
        self.pending.remove(nonce)
    }

    /// Merge an authoritative entry from chain sync. Supersedes any pending
    /// entry with the same nonce.
    pub fn merge_synced(&mut self, entry: TransferEntry) {
        if let EntryId::Op(nonce) = entry.id {
            if self.pending.remove(&nonce).is_some() {
                debug!(?nonce, status = ?entry.status, "pending op reconciled");
            }
        }

        match self.synced.get(&entry.id) {
            Some(existing) if existing.status.rank() >= entry.status.rank() => {}
            _ => {
                self.synced.insert(entry.id, entry);
            }
        }
    }

    /// Promote confirmed entries at or below `block` to finalized.
    pub fn finalize_through(&mut self, block: u64) {
        for entry in self.synced.values_mut() {
            if entry.status == OpStatus::Confirmed
                && entry.block_number.is_some_and(|b| b <= block)
            {
                entry.status = OpStatus::Finalized;
            }
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &TransferEntry> {
        self.pending.values()
    }

    pub fn get(&self, id: &EntryId) -> Option<&TransferEntry> {
        match id {
            EntryId::Op(nonce) => self.synced.get(id).or_else(|| self.pending.get(nonce)),
            EntryId::Log { .. } => self.synced.get(id),
        }
    }

    /// Synced entries plus the pending overlay, oldest first.
    pub fn merged(&self) -> Vec<&TransferEntry> {
        let mut entries: Vec<&TransferEntry> = self
            .synced
            .values()
            .chain(
                self.pending
                    .values()
                    .filter(|p| !self.synced.contains_key(&p.id)),
            )
            .collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        entries
    }
}

/// Snapshot delivered by chain sync.
#[derive(Debug, Clone, Default)]
pub struct SyncUpdate {
    pub last_block: u64,
    pub last_finalized_block: u64,
    pub balance: U256,
    /// Full key-slot list at `last_block`, when the indexer reports it
    pub key_slots: Option<Vec<KeySlot>>,
    pub entries: Vec<TransferEntry>,
}

/// The device's account, shared by the wallet and its submitters. `None`
/// before provisioning and after the account is deleted.
pub type SharedAccount = Arc<Mutex<Option<Account>>>;

pub(crate) fn lock_account(account: &SharedAccount) -> MutexGuard<'_, Option<Account>> {
    account.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub name: String,
    pub address: Address,
    pub home_chain_id: u64,
    pub home_coin: Address,
    pub key_slots: Vec<KeySlot>,
    pub balance: U256,
    pub last_block: u64,
    pub last_finalized_block: u64,
    pub history: TransferHistory,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        address: Address,
        home_chain_id: u64,
        home_coin: Address,
        first_key: KeySlot,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            home_chain_id,
            home_coin,
            key_slots: vec![first_key],
            balance: U256::ZERO,
            last_block: 0,
            last_finalized_block: 0,
            history: TransferHistory::default(),
        }
    }

    /// An account with no key slots left is deleted.
    pub fn is_usable(&self) -> bool {
        !self.key_slots.is_empty()
    }

    pub fn used_slots(&self) -> impl Iterator<Item = u8> + '_ {
        self.key_slots.iter().map(|k| k.slot)
    }

    pub fn slot_for_key(&self, pubkey: &[B256; 2]) -> Option<u8> {
        self.key_slots
            .iter()
            .find(|k| &k.pubkey == pubkey)
            .map(|k| k.slot)
    }

    pub fn recent_transfers(&self) -> Vec<&TransferEntry> {
        self.history.merged()
    }

    /// Apply a chain sync snapshot. Entries always merge; balance and key
    /// slots only move forward in block height.
    pub fn apply_sync(&mut self, update: SyncUpdate) {
        if update.last_block >= self.last_block {
            self.last_block = update.last_block;
            self.balance = update.balance;
            if let Some(slots) = update.key_slots {
                self.key_slots = slots;
            }
        }
        self.last_finalized_block = self.last_finalized_block.max(update.last_finalized_block);

        for entry in update.entries {
            self.history.merge_synced(entry);
        }
        self.history.finalize_through(self.last_finalized_block);
    }
}
