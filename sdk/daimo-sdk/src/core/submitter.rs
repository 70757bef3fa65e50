//! Operation submission state machine
//!
//! ```text
//! idle -> loading -> success
//!                 -> error -> (exec again, only if nothing reached the bundler)
//! ```
//!
//! One submitter drives one intent. `exec` is single-flight: a call made
//! while another is in flight, or after the submitter has settled for good,
//! returns [`ExecOutcome::Ignored`] without touching the custodian or the
//! network. Every failure is published on the status channel and returned.

use alloy_primitives::{Address, B256};
use daimo_interface::Nonce;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::account::{lock_account, Account, OpStatus, SharedAccount};
use crate::basic::actions::{Intent, OperationBuilder};
use crate::config::SdkConfig;
use crate::core::connection::BundlerConnection;
use crate::core::custodian::KeyCustodian;
use crate::core::nonce::NonceAllocator;
use crate::core::signer::SigningCallback;
use crate::core::status::ActStatus;
use crate::error::{DaimoSdkError, Result};
use crate::types::{ChainGasConstants, Cost, Receipt, ReceiptStatus};
use crate::utils::{now_unix, token_units_to_dollars};

/// Applied to the local account inside the success transition.
pub type AccountTransform = Box<dyn Fn(&mut Option<Account>) + Send + Sync>;

/// Custodian key deleted once the operation confirms.
pub struct KeyRetirement {
    pub custodian: Arc<dyn KeyCustodian>,
    pub key_name: String,
}

/// Everything a submitter shares with the wallet that created it.
pub struct SubmitContext<C> {
    pub connection: Arc<C>,
    pub account: SharedAccount,
    pub nonces: Arc<Mutex<NonceAllocator>>,
    pub config: SdkConfig,
}

impl<C> Clone for SubmitContext<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            account: self.account.clone(),
            nonces: self.nonces.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    InFlight,
    Succeeded,
    Failed { retryable: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome<T> {
    /// Another `exec` was in flight, or this submitter already settled
    Ignored,
    Succeeded { receipt: Receipt, data: Option<T> },
}

pub struct OperationSubmitter<C, S, T> {
    ctx: SubmitContext<C>,
    signer: S,
    builder: OperationBuilder,
    intent: Intent,
    nonce: Nonce,
    gas: Mutex<ChainGasConstants>,
    phase: Mutex<Phase>,
    status: watch::Sender<ActStatus<T>>,
    transform: Option<AccountTransform>,
    retire_key: Option<KeyRetirement>,
    success_data: Option<T>,
    status_data: Option<T>,
}

impl<C, S, T> std::fmt::Debug for OperationSubmitter<C, S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationSubmitter")
            .field("intent", &self.intent)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

impl<C, S, T> OperationSubmitter<C, S, T>
where
    C: BundlerConnection,
    S: SigningCallback,
    T: Clone + Send + Sync,
{
    /// Allocates the intent's nonce and publishes the idle cost.
    pub fn new(
        ctx: SubmitContext<C>,
        signer: S,
        sender: Address,
        intent: Intent,
        gas: ChainGasConstants,
    ) -> Self {
        let nonce = lock(&ctx.nonces).allocate(intent.nonce_type(), intent.fingerprint());
        let builder = OperationBuilder::new(sender, &ctx.config);
        let (status, _) = watch::channel(ActStatus::idle(Cost::default()));

        let submitter = Self {
            ctx,
            signer,
            builder,
            intent,
            nonce,
            gas: Mutex::new(gas),
            phase: Mutex::new(Phase::Idle),
            status,
            transform: None,
            retire_key: None,
            success_data: None,
            status_data: None,
        };
        submitter.status.send_replace(ActStatus::idle(submitter.cost()));
        submitter
    }

    pub fn with_transform(mut self, transform: AccountTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_key_retirement(mut self, retirement: KeyRetirement) -> Self {
        self.retire_key = Some(retirement);
        self
    }

    /// Data returned on success and published with the success status.
    pub fn with_success_data(mut self, data: T) -> Self {
        self.status_data = Some(data.clone());
        self.success_data = Some(data);
        self
    }

    /// Data returned on success that must not reach status subscribers.
    /// `public` is published in its place.
    pub fn with_secret_success_data(mut self, data: T, public: T) -> Self {
        self.success_data = Some(data);
        self.status_data = Some(public);
        self
    }

    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn status(&self) -> ActStatus<T> {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActStatus<T>> {
        self.status.subscribe()
    }

    /// Projected cost from the gas snapshot the next `exec` will build with.
    pub fn cost(&self) -> Cost {
        let fee_dollars = lock(&self.gas).estimated_fee_dollars;
        let amount = token_units_to_dollars(
            self.intent.outgoing_amount(),
            self.ctx.config.chain.token_decimals,
        );
        Cost {
            fee_dollars,
            total_dollars: amount + fee_dollars,
        }
    }

    /// Fetch fresh gas constants. Ignored while an attempt is in flight or
    /// after success, so the published cost always matches what is built.
    pub async fn refresh_gas(&self) -> Result<Cost> {
        let gas = self
            .ctx
            .connection
            .get_gas_constants()
            .await
            .map_err(|e| DaimoSdkError::Connection(e.to_string()))?;

        {
            let phase = lock(&self.phase);
            match *phase {
                Phase::InFlight | Phase::Succeeded => {},
                _ => {
                    *lock(&self.gas) = gas;
                    if *phase == Phase::Idle {
                        self.status.send_replace(ActStatus::idle(self.cost()));
                    }
                },
            }
        }
        Ok(self.cost())
    }

    pub async fn exec(&self) -> Result<ExecOutcome<T>> {
        {
            let mut phase = lock(&self.phase);
            match *phase {
                Phase::Idle | Phase::Failed { retryable: true } => *phase = Phase::InFlight,
                current => {
                    debug!(nonce = ?self.nonce, ?current, "exec ignored");
                    return Ok(ExecOutcome::Ignored);
                },
            }
        }

        let cost = self.cost();
        match self.run(cost).await {
            Ok(receipt) => {
                *lock(&self.phase) = Phase::Succeeded;
                info!(
                    nonce = ?self.nonce,
                    tx_hash = %receipt.transaction_hash,
                    block = receipt.block_number,
                    "operation confirmed"
                );
                self.status.send_replace(ActStatus::success(
                    cost,
                    "success",
                    self.status_data.clone(),
                ));
                Ok(ExecOutcome::Succeeded {
                    receipt,
                    data: self.success_data.clone(),
                })
            },
            Err(err) => {
                *lock(&self.phase) = Phase::Failed {
                    retryable: err.is_retryable_in_place(),
                };
                warn!(nonce = ?self.nonce, kind = ?err.kind(), error = %err, "operation failed");
                self.status.send_replace(ActStatus::error(cost, &err));
                Err(err)
            },
        }
    }

    async fn run(&self, cost: Cost) -> Result<Receipt> {
        self.status.send_replace(ActStatus::loading(cost, "authorizing"));
        self.signer.ensure_key().await?;

        let gas = lock(&self.gas).clone();
        let mut op = self.builder.build(&self.intent, &self.nonce, &gas)?;
        let op_hash = op.hash(
            self.ctx.config.chain.entry_point,
            self.ctx.config.chain.chain_id,
        );

        debug!(nonce = ?self.nonce, %op_hash, "requesting signature");
        op.signature = self.signer.sign(op_hash.as_slice()).await?;

        self.status.send_replace(ActStatus::loading(cost, "sending"));
        let user_op_hash = self
            .ctx
            .connection
            .send_user_operation(&op)
            .await
            .map_err(|e| DaimoSdkError::from_bundler(e.to_string()))?;
        info!(nonce = ?self.nonce, %user_op_hash, "user operation sent");

        let event = self.intent.op_event(self.builder.sender());
        self.with_account(|account| {
            account.history.add_pending(self.nonce, event, now_unix())
        });

        let bundle = self
            .ctx
            .connection
            .wait_for_bundle(&user_op_hash)
            .await
            .map_err(|e| {
                warn!(%user_op_hash, error = %e, "bundle wait failed");
                DaimoSdkError::BundleNotFound(user_op_hash)
            })?;
        let tx_hash = bundle.transaction_hash;
        self.with_account(|account| {
            account
                .history
                .update_pending(&self.nonce, OpStatus::Pending, Some(tx_hash))
        });
        self.status.send_replace(ActStatus::loading(cost, "submitted"));

        let receipt = self.await_receipt(tx_hash).await?;

        // The nonce is spent on-chain either way
        lock(&self.ctx.nonces).forget(&self.intent.fingerprint());

        if receipt.status == ReceiptStatus::Reverted {
            self.with_account(|account| {
                account
                    .history
                    .update_pending(&self.nonce, OpStatus::Failed, Some(tx_hash))
            });
            return Err(DaimoSdkError::Reverted(tx_hash));
        }

        if let Some(retire) = &self.retire_key {
            if let Err(e) = retire.custodian.delete_key_pair(&retire.key_name).await {
                warn!(key = %retire.key_name, error = %e, "failed to delete retired key");
            }
        }
        if let Some(transform) = &self.transform {
            let mut account = lock_account(&self.ctx.account);
            transform(&mut *account);
        }
        Ok(receipt)
    }

    /// Poll for the receipt under the configured ceiling. Running out of
    /// time is reported as [`DaimoSdkError::BundleNotFound`]; the pending
    /// entry stays for chain sync to settle.
    async fn await_receipt(&self, tx_hash: B256) -> Result<Receipt> {
        let submit = &self.ctx.config.submit;
        let poll = async {
            loop {
                match self.ctx.connection.get_transaction_receipt(&tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {},
                    Err(e) => debug!(%tx_hash, error = %e, "receipt poll failed"),
                }
                tokio::time::sleep(submit.receipt_poll_interval()).await;
            }
        };

        tokio::time::timeout(submit.receipt_timeout(), poll)
            .await
            .map_err(|_| {
                warn!(%tx_hash, timeout_ms = submit.receipt_timeout_ms, "receipt timed out");
                DaimoSdkError::BundleNotFound(tx_hash)
            })
    }

    fn with_account<R>(&self, f: impl FnOnce(&mut Account) -> R) -> Option<R> {
        lock_account(&self.ctx.account).as_mut().map(f)
    }
}

pub(crate) fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
