use alloy_primitives::{Address, B256, U256};
use daimo_interface::Nonce;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::account::{lock_account, Account, SharedAccount, SyncUpdate};
use crate::basic::actions::Intent;
use crate::config::SdkConfig;
use crate::core::connection::BundlerConnection;
use crate::core::custodian::{HardwareSecurityLevel, KeyCustodian};
use crate::core::nonce::NonceAllocator;
use crate::core::signer::DeviceSigner;
use crate::core::submitter::{lock, KeyRetirement, OperationSubmitter, SubmitContext};
use crate::error::{DaimoSdkError, Result};
use crate::types::{find_unused_slot, ChainGasConstants, KeySlot, SlotTier};
use crate::utils::{now_unix, p256_key_words};

/// Result of merging a chain sync snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated,
    /// The account no longer holds this device's key and was deleted
    AccountRemoved,
}

/// Submitter signed by the wallet's device key.
pub type WalletSubmitter<C, K, T> = OperationSubmitter<C, DeviceSigner<K>, T>;

/// Entry point for everything the device does with its account.
///
/// Owns the local account and the nonce allocator, and hands out one
/// [`OperationSubmitter`] per user intent. Construct one per device and pass
/// it by reference to the UI layer.
pub struct DaimoWallet<C, K> {
    pub(crate) ctx: SubmitContext<C>,
    pub(crate) custodian: Arc<K>,
}

impl<C, K> DaimoWallet<C, K>
where
    C: BundlerConnection,
    K: KeyCustodian + 'static,
{
    pub fn new(connection: Arc<C>, custodian: Arc<K>, config: SdkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: SubmitContext {
                connection,
                account: Arc::new(Mutex::new(None)),
                nonces: Arc::new(Mutex::new(NonceAllocator::new())),
                config,
            },
            custodian,
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.ctx.config
    }

    /// Install the account this device signs for.
    pub fn load_account(&self, account: Account) {
        info!(name = %account.name, address = %account.address, "account loaded");
        *lock_account(&self.ctx.account) = Some(account);
    }

    /// Snapshot of the local account, `None` if none is loaded or it was
    /// deleted.
    pub fn account(&self) -> Option<Account> {
        lock_account(&self.ctx.account).clone()
    }

    pub fn shared_account(&self) -> SharedAccount {
        self.ctx.account.clone()
    }

    /// Merge a chain sync snapshot into the local account.
    ///
    /// Nonces the snapshot shows as spent are released, so the same intent
    /// can be issued again. If no key slots remain, or this device's key is
    /// no longer among them, the local account is deleted.
    pub async fn apply_sync(&self, update: SyncUpdate) -> Result<SyncOutcome> {
        let device_key = self.device_key().await?;
        let spent: Vec<Nonce> = update.entries.iter().filter_map(|e| e.nonce()).collect();

        let outcome = {
            let mut guard = lock_account(&self.ctx.account);
            let account = guard
                .as_mut()
                .ok_or_else(|| DaimoSdkError::InvalidAccountState("no account loaded".to_string()))?;
            account.apply_sync(update);

            let key_present = match device_key {
                Some(key) => account.slot_for_key(&key).is_some(),
                None => true,
            };
            if account.is_usable() && key_present {
                SyncOutcome::Updated
            } else {
                warn!(
                    address = %account.address,
                    slots = account.key_slots.len(),
                    "device key no longer on account, deleting local account"
                );
                *guard = None;
                SyncOutcome::AccountRemoved
            }
        };

        let mut nonces = lock(&self.ctx.nonces);
        for nonce in &spent {
            if nonces.release(nonce) {
                debug!(?nonce, "nonce spent on-chain, intent released");
            }
        }
        Ok(outcome)
    }

    pub fn hardware_security_level(&self) -> HardwareSecurityLevel {
        self.custodian.hardware_security_level()
    }

    /// Public key of this device's signing key, if the custodian holds one.
    pub async fn device_key(&self) -> Result<Option<[B256; 2]>> {
        let key_name = &self.ctx.config.signing.key_name;
        match self.custodian.fetch_public_key(key_name).await? {
            Some(der) => Ok(Some(p256_key_words(&der)?)),
            None => Ok(None),
        }
    }

    /// Return the device key, creating it first if the custodian has none.
    pub async fn create_device_key(&self) -> Result<[B256; 2]> {
        if let Some(key) = self.device_key().await? {
            return Ok(key);
        }
        let der = self
            .custodian
            .create_key_pair(&self.ctx.config.signing.key_name)
            .await?;
        info!(key = %self.ctx.config.signing.key_name, "device key created");
        p256_key_words(&der)
    }

    pub async fn transfer(
        &self,
        to: Address,
        amount: U256,
    ) -> Result<WalletSubmitter<C, K, ()>> {
        let (sender, signer) = self.device_signer().await?;
        let gas = self.gas().await?;
        Ok(OperationSubmitter::new(
            self.ctx.clone(),
            signer,
            sender,
            Intent::Transfer { to, amount },
            gas,
        ))
    }

    /// Register `key` in the lowest free slot of `tier`.
    pub async fn add_key(
        &self,
        key: [B256; 2],
        tier: SlotTier,
    ) -> Result<WalletSubmitter<C, K, KeySlot>> {
        let (sender, signer) = self.device_signer().await?;
        let slot = {
            let account = lock_account(&self.ctx.account);
            let account = account
                .as_ref()
                .ok_or_else(|| DaimoSdkError::InvalidAccountState("no account loaded".to_string()))?;
            if account.slot_for_key(&key).is_some() {
                return Err(DaimoSdkError::InvalidAccountState(
                    "key already registered".to_string(),
                ));
            }
            find_unused_slot(account.used_slots(), tier).ok_or_else(|| {
                DaimoSdkError::InvalidAccountState(format!("no free {:?} slot", tier))
            })?
        };
        let gas = self.gas().await?;

        let key_slot = KeySlot {
            slot,
            pubkey: key,
            added_at: None,
        };
        let added = key_slot.clone();
        Ok(OperationSubmitter::new(
            self.ctx.clone(),
            signer,
            sender,
            Intent::AddKey { slot, key },
            gas,
        )
        .with_success_data(key_slot)
        .with_transform(Box::new(move |account: &mut Option<Account>| {
            if let Some(account) = account.as_mut() {
                if !account.key_slots.iter().any(|k| k.slot == added.slot) {
                    account.key_slots.push(KeySlot {
                        added_at: Some(now_unix()),
                        ..added.clone()
                    });
                }
            }
        })))
    }

    /// Remove the key in `slot`. Removing this device's own key deletes the
    /// custodian key and the local account, only once the removal confirms.
    pub async fn remove_key(&self, slot: u8) -> Result<WalletSubmitter<C, K, ()>> {
        let device_key = self.device_key().await?;
        let (sender, signer) = self.device_signer().await?;
        let own = {
            let account = lock_account(&self.ctx.account);
            let account = account
                .as_ref()
                .ok_or_else(|| DaimoSdkError::InvalidAccountState("no account loaded".to_string()))?;
            if !account.used_slots().any(|s| s == slot) {
                return Err(DaimoSdkError::InvalidAccountState(format!(
                    "slot {} is not registered",
                    slot
                )));
            }
            device_key.and_then(|key| account.slot_for_key(&key)) == Some(slot)
        };
        let gas = self.gas().await?;

        let submitter = OperationSubmitter::new(
            self.ctx.clone(),
            signer,
            sender,
            Intent::RemoveKey { slot },
            gas,
        );
        if !own {
            return Ok(submitter.with_transform(Box::new(move |account: &mut Option<Account>| {
                if let Some(account) = account.as_mut() {
                    account.key_slots.retain(|k| k.slot != slot);
                }
            })));
        }

        info!(slot, "removing own device key");
        let custodian: Arc<dyn KeyCustodian> = self.custodian.clone();
        Ok(submitter
            .with_key_retirement(KeyRetirement {
                custodian,
                key_name: self.ctx.config.signing.key_name.clone(),
            })
            .with_transform(Box::new(|account: &mut Option<Account>| *account = None)))
    }

    /// Account address plus a signer bound to the slot holding this
    /// device's key.
    pub(crate) async fn device_signer(&self) -> Result<(Address, DeviceSigner<K>)> {
        let signing = &self.ctx.config.signing;
        let key = self
            .device_key()
            .await?
            .ok_or_else(|| DaimoSdkError::KeyNotFound(signing.key_name.clone()))?;

        let (address, slot) = {
            let account = lock_account(&self.ctx.account);
            let account = account
                .as_ref()
                .ok_or_else(|| DaimoSdkError::InvalidAccountState("no account loaded".to_string()))?;
            let slot = account.slot_for_key(&key).ok_or_else(|| {
                DaimoSdkError::InvalidAccountState("device key is not registered".to_string())
            })?;
            (account.address, slot)
        };

        let signer = DeviceSigner::new(self.custodian.clone(), signing.key_name.clone(), slot)
            .with_prompt(signing.prompt())
            .with_validity(signing.valid_for_secs);
        Ok((address, signer))
    }

    pub(crate) async fn gas(&self) -> Result<ChainGasConstants> {
        self.ctx
            .connection
            .get_gas_constants()
            .await
            .map_err(|e| DaimoSdkError::Connection(e.to_string()))
    }
}
