use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use anyhow::Result;
use async_trait::async_trait;
use daimo_interface::calls::Call;
use daimo_interface::{
    AccountSignature, IDaimoAccount, IERC20, IEphemeralNotes, Nonce, UserOperation,
    SELF_RECLAIM_SIGNATURE,
};
use daimo_sdk::account::{Account, EntryId, OpEvent, OpStatus, SyncUpdate, TransferEntry};
use daimo_sdk::core::connection::BundlerConnection;
use daimo_sdk::core::custodian::MemoryKeyCustodian;
use daimo_sdk::core::ephemeral::recover_claim_signer;
use daimo_sdk::types::{
    BundleEvent, ChainGasConstants, KeySlot, NoteRecord, Receipt, ReceiptStatus,
};
use daimo_sdk::utils::now_unix;
use daimo_sdk::{DaimoWallet, SdkConfig};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

type BoxError = Box<dyn Error + Send + Sync>;

pub const NOTES_CONTRACT: Address = address!("4e4e4e4e4e4e4e4e4e4e4e4e4e4e4e4e4e4e4e4e");

/// Paymaster fee charged per operation, in token units ($0.01)
pub const FEE_UNITS: u64 = 10_000;

pub fn dollars(n: u64) -> U256 {
    U256::from(n * 1_000_000)
}

pub fn test_config() -> SdkConfig {
    let mut config = SdkConfig::default();
    config.chain.notes_contract = NOTES_CONTRACT;
    config.submit.receipt_timeout_ms = 200;
    config.submit.receipt_poll_interval_ms = 10;
    config
}

/// One executed operation, as an indexer would report it.
#[derive(Debug, Clone)]
struct ChainLog {
    sender: Address,
    nonce: Nonce,
    tx_hash: B256,
    block: u64,
    timestamp: u64,
    event: OpEvent,
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    block: u64,
    finalized: u64,
    fee_dollars: f64,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    notes: HashMap<Address, NoteRecord>,
    keys: HashMap<Address, BTreeMap<u8, [B256; 2]>>,
    used_nonces: HashSet<(Address, U256)>,
    bundles: HashMap<B256, B256>,
    receipts: HashMap<B256, Receipt>,
    logs: Vec<ChainLog>,
}

/// In-memory chain standing in for the bundler, the account contracts,
/// the notes escrow and the token.
///
/// User operations are checked like the entry point would: nonce unused,
/// P-256 signature valid for the key slot. Batches execute atomically.
pub struct TestChain {
    config: SdkConfig,
    state: Mutex<ChainState>,
    offline: AtomicBool,
    hold_receipts: AtomicBool,
    sent: AtomicUsize,
    note_queries: AtomicUsize,
}

impl TestChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            config: test_config(),
            state: Mutex::new(ChainState {
                fee_dollars: 0.01,
                ..ChainState::default()
            }),
            offline: AtomicBool::new(false),
            hold_receipts: AtomicBool::new(false),
            sent: AtomicUsize::new(0),
            note_queries: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> SdkConfig {
        self.config.clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Receipts stay unknown to the node while set. Operations still execute.
    pub fn hold_receipts(&self, hold: bool) {
        self.hold_receipts.store(hold, Ordering::SeqCst);
    }

    /// Accepted user operations
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn note_queries(&self) -> usize {
        self.note_queries.load(Ordering::SeqCst)
    }

    pub async fn set_fee_dollars(&self, fee: f64) {
        self.state.lock().await.fee_dollars = fee;
    }

    pub async fn fund(&self, account: Address, amount: U256) {
        *self.state.lock().await.balances.entry(account).or_default() += amount;
    }

    pub async fn balance_of(&self, account: Address) -> U256 {
        self.state
            .lock()
            .await
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    pub async fn register_key(&self, account: Address, slot: u8, key: [B256; 2]) {
        self.state
            .lock()
            .await
            .keys
            .entry(account)
            .or_default()
            .insert(slot, key);
    }

    /// A removal made by some other device of the same account.
    pub async fn unregister_key(&self, account: Address, slot: u8) {
        let mut state = self.state.lock().await;
        if let Some(keys) = state.keys.get_mut(&account) {
            keys.remove(&slot);
        }
        state.block += 1;
    }

    pub async fn key_slots(&self, account: Address) -> Vec<u8> {
        self.state
            .lock()
            .await
            .keys
            .get(&account)
            .map(|keys| keys.keys().copied().collect())
            .unwrap_or_default()
    }

    pub async fn note(&self, ephemeral_owner: Address) -> Option<NoteRecord> {
        self.state.lock().await.notes.get(&ephemeral_owner).cloned()
    }

    pub async fn finalize_all(&self) {
        let mut state = self.state.lock().await;
        state.finalized = state.block;
    }

    /// What chain sync would deliver for `account` right now.
    pub async fn sync_update(&self, account: Address) -> SyncUpdate {
        let state = self.state.lock().await;
        let entries = state
            .logs
            .iter()
            .filter(|log| log.sender == account)
            .map(|log| TransferEntry {
                id: EntryId::Op(log.nonce),
                event: log.event.clone(),
                status: OpStatus::Confirmed,
                timestamp: log.timestamp,
                tx_hash: Some(log.tx_hash),
                block_number: Some(log.block),
            })
            .collect();
        let key_slots = state.keys.get(&account).map(|keys| {
            keys.iter()
                .map(|(slot, pubkey)| KeySlot {
                    slot: *slot,
                    pubkey: *pubkey,
                    added_at: None,
                })
                .collect()
        });

        SyncUpdate {
            last_block: state.block,
            last_finalized_block: state.finalized,
            balance: state.balances.get(&account).copied().unwrap_or_default(),
            key_slots,
            entries,
        }
    }

    fn verify_signature(&self, state: &ChainState, op: &UserOperation) -> Result<(), BoxError> {
        let sig = AccountSignature::decode(&op.signature)?;
        let key = state
            .keys
            .get(&op.sender)
            .and_then(|keys| keys.get(&sig.key_slot))
            .ok_or("AA24 unknown key slot")?;

        let x: p256::FieldBytes = key[0].0.into();
        let y: p256::FieldBytes = key[1].0.into();
        let point = p256::EncodedPoint::from_affine_coordinates(&x, &y, false);
        let verifying_key =
            VerifyingKey::from_encoded_point(&point).map_err(|_| "AA24 invalid key")?;
        let signature =
            Signature::from_scalars(sig.r.0, sig.s.0).map_err(|_| "AA24 malformed signature")?;
        if signature.normalize_s().is_some() {
            return Err("AA24 high-s signature".into());
        }

        let hash = op.hash(self.config.chain.entry_point, self.config.chain.chain_id);
        verifying_key
            .verify(hash.as_slice(), &signature)
            .map_err(|_| "AA24 signature error")?;
        Ok(())
    }

    /// Run one call against `state`. `Ok(None)` for calls that do not
    /// produce a history event.
    fn apply_call(
        &self,
        state: &mut ChainState,
        sender: Address,
        call: &Call,
    ) -> Result<Option<OpEvent>, BoxError> {
        let token = self.config.chain.token;
        let selector: [u8; 4] = call
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or("short call data")?;

        if call.dest == token && selector == IERC20::transferCall::SELECTOR {
            let c = IERC20::transferCall::abi_decode(&call.data, true)?;
            debit(state, sender, c.amount)?;
            *state.balances.entry(c.to).or_default() += c.amount;
            return Ok(Some(OpEvent::Transfer {
                from: sender,
                to: c.to,
                amount: c.amount,
            }));
        }
        if call.dest == token && selector == IERC20::approveCall::SELECTOR {
            let c = IERC20::approveCall::abi_decode(&call.data, true)?;
            state.allowances.insert((sender, c.spender), c.amount);
            return Ok(None);
        }

        if call.dest == NOTES_CONTRACT && selector == IEphemeralNotes::createNoteCall::SELECTOR {
            let c = IEphemeralNotes::createNoteCall::abi_decode(&call.data, true)?;
            let allowance = state
                .allowances
                .get(&(sender, NOTES_CONTRACT))
                .copied()
                .unwrap_or_default();
            if allowance < c.amount {
                return Err("insufficient allowance".into());
            }
            if allowance != U256::MAX {
                state
                    .allowances
                    .insert((sender, NOTES_CONTRACT), allowance - c.amount);
            }
            if state.notes.contains_key(&c.ephemeralOwner) {
                return Err("note exists".into());
            }
            debit(state, sender, c.amount)?;
            state.notes.insert(
                c.ephemeralOwner,
                NoteRecord {
                    ephemeral_owner: c.ephemeralOwner,
                    from: sender,
                    amount: c.amount,
                    memo: None,
                },
            );
            return Ok(Some(OpEvent::CreateNote {
                from: sender,
                ephemeral_owner: c.ephemeralOwner,
                amount: c.amount,
            }));
        }
        if call.dest == NOTES_CONTRACT && selector == IEphemeralNotes::claimNoteCall::SELECTOR {
            let c = IEphemeralNotes::claimNoteCall::abi_decode(&call.data, true)?;
            let note = state
                .notes
                .remove(&c.ephemeralOwner)
                .ok_or("note does not exist")?;
            let authorized = if c.signature.as_ref() == SELF_RECLAIM_SIGNATURE.as_slice() {
                sender == note.from
            } else {
                recover_claim_signer(&sender, &c.signature) == Some(c.ephemeralOwner)
            };
            if !authorized {
                return Err("invalid claim signature".into());
            }
            *state.balances.entry(sender).or_default() += note.amount;
            return Ok(Some(OpEvent::ClaimNote {
                ephemeral_owner: c.ephemeralOwner,
                from: note.from,
                to: sender,
                amount: note.amount,
            }));
        }

        if call.dest == sender && selector == IDaimoAccount::addSigningKeyCall::SELECTOR {
            let c = IDaimoAccount::addSigningKeyCall::abi_decode(&call.data, true)?;
            let keys = state.keys.entry(sender).or_default();
            if keys.contains_key(&c.slot) {
                return Err("slot in use".into());
            }
            keys.insert(c.slot, c.key);
            return Ok(Some(OpEvent::AddKey { slot: c.slot }));
        }
        if call.dest == sender && selector == IDaimoAccount::removeSigningKeyCall::SELECTOR {
            let c = IDaimoAccount::removeSigningKeyCall::abi_decode(&call.data, true)?;
            let keys = state.keys.entry(sender).or_default();
            keys.remove(&c.slot).ok_or("slot empty")?;
            return Ok(Some(OpEvent::RemoveKey { slot: c.slot }));
        }

        Err(format!("unsupported call to {}", call.dest).into())
    }
}

fn debit(state: &mut ChainState, account: Address, amount: U256) -> Result<(), BoxError> {
    let balance = state.balances.entry(account).or_default();
    if *balance < amount {
        return Err("insufficient balance".into());
    }
    *balance -= amount;
    Ok(())
}

#[async_trait]
impl BundlerConnection for TestChain {
    async fn get_gas_constants(&self) -> Result<ChainGasConstants, BoxError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("bundler unreachable".into());
        }
        Ok(ChainGasConstants {
            max_fee_per_gas: U256::from(1_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000u64),
            pre_verification_gas: U256::from(50_000u64),
            paymaster_and_data: Bytes::from(vec![0x99; 20]),
            estimated_fee_dollars: self.state.lock().await.fee_dollars,
        })
    }

    async fn send_user_operation(&self, op: &UserOperation) -> Result<B256, BoxError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("bundler unreachable".into());
        }
        let nonce = Nonce::from_u256(op.nonce).ok_or("AA25 malformed nonce")?;
        let batch = IDaimoAccount::executeCall::abi_decode(&op.call_data, true)?.calls;

        let mut state = self.state.lock().await;
        if state.used_nonces.contains(&(op.sender, op.nonce)) {
            return Err("AA25 invalid account nonce".into());
        }
        self.verify_signature(&state, op)?;
        state.used_nonces.insert((op.sender, op.nonce));
        self.sent.fetch_add(1, Ordering::SeqCst);

        let user_op_hash = op.hash(self.config.chain.entry_point, self.config.chain.chain_id);
        let tx_hash = keccak256(user_op_hash);
        state.block += 1;
        let block = state.block;

        // Atomic batch: commit only if every call succeeds
        let mut next = state.clone();
        let mut event = None;
        let mut outcome = Ok(());
        for call in &batch {
            match self.apply_call(&mut next, op.sender, call) {
                Ok(Some(e)) => event = Some(e),
                Ok(None) => {},
                Err(e) => {
                    outcome = Err(e);
                    break;
                },
            }
        }

        let status = match outcome {
            Ok(()) => {
                *state = next;
                if let Some(event) = event {
                    state.logs.push(ChainLog {
                        sender: op.sender,
                        nonce,
                        tx_hash,
                        block,
                        timestamp: now_unix(),
                        event,
                    });
                }
                ReceiptStatus::Success
            },
            Err(_) => ReceiptStatus::Reverted,
        };

        let balance = state.balances.entry(op.sender).or_default();
        *balance = balance.saturating_sub(U256::from(FEE_UNITS));

        state.bundles.insert(user_op_hash, tx_hash);
        state.receipts.insert(
            tx_hash,
            Receipt {
                transaction_hash: tx_hash,
                block_number: block,
                status,
            },
        );
        Ok(user_op_hash)
    }

    async fn wait_for_bundle(&self, user_op_hash: &B256) -> Result<BundleEvent, BoxError> {
        let state = self.state.lock().await;
        let transaction_hash = state
            .bundles
            .get(user_op_hash)
            .copied()
            .ok_or("unknown user operation")?;
        Ok(BundleEvent { transaction_hash })
    }

    async fn get_transaction_receipt(&self, tx_hash: &B256) -> Result<Option<Receipt>, BoxError> {
        if self.hold_receipts.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.state.lock().await.receipts.get(tx_hash).copied())
    }

    async fn get_note(&self, ephemeral_owner: &Address) -> Result<Option<NoteRecord>, BoxError> {
        self.note_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().await.notes.get(ephemeral_owner).cloned())
    }

    async fn get_allowance(&self, owner: &Address, spender: &Address) -> Result<U256, BoxError> {
        Ok(self
            .state
            .lock()
            .await
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default())
    }
}

pub struct TestWallet {
    pub address: Address,
    pub custodian: Arc<MemoryKeyCustodian>,
    pub wallet: DaimoWallet<TestChain, MemoryKeyCustodian>,
}

pub async fn setup_wallet(chain: &Arc<TestChain>, name: &str, funds: U256) -> Result<TestWallet> {
    setup_wallet_with(chain, name, funds, MemoryKeyCustodian::new()).await
}

/// Provision an account whose slot 0 holds the custodian's device key.
pub async fn setup_wallet_with(
    chain: &Arc<TestChain>,
    name: &str,
    funds: U256,
    custodian: MemoryKeyCustodian,
) -> Result<TestWallet> {
    let custodian = Arc::new(custodian);
    let config = chain.config();
    let wallet = DaimoWallet::new(chain.clone(), custodian.clone(), config.clone())?;

    let key = wallet.create_device_key().await?;
    let address = Address::from_slice(&keccak256(name.as_bytes())[12..]);
    chain.register_key(address, 0, key).await;
    chain.fund(address, funds).await;

    let mut account = Account::new(
        name,
        address,
        config.chain.chain_id,
        config.chain.token,
        KeySlot {
            slot: 0,
            pubkey: key,
            added_at: None,
        },
    );
    account.balance = funds;
    wallet.load_account(account);

    Ok(TestWallet {
        address,
        custodian,
        wallet,
    })
}
