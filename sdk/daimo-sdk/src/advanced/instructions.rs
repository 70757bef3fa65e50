use alloy_primitives::{Address, Bytes, B256, U256};
use daimo_interface::calls::{self, Call};
use daimo_interface::{Nonce, UserOperation, SELF_RECLAIM_SIGNATURE};

use crate::config::GasSettings;
use crate::types::ChainGasConstants;

pub fn transfer(token: Address, to: Address, amount: U256) -> Vec<Call> {
    vec![calls::erc20_transfer(token, to, amount)]
}

pub fn add_key(account: Address, slot: u8, key: [B256; 2]) -> Vec<Call> {
    vec![calls::add_signing_key(account, slot, key)]
}

pub fn remove_key(account: Address, slot: u8) -> Vec<Call> {
    vec![calls::remove_signing_key(account, slot)]
}

/// Fund a note. With `needs_approval`, the approval rides in the same batch
/// ahead of the funding call.
pub fn create_note(
    token: Address,
    notes: Address,
    ephemeral_owner: Address,
    amount: U256,
    needs_approval: bool,
) -> Vec<Call> {
    let mut batch = Vec::with_capacity(2);
    if needs_approval {
        batch.push(calls::erc20_approve(token, notes, U256::MAX));
    }
    batch.push(calls::create_note(notes, ephemeral_owner, amount));
    batch
}

/// Claim a note. `signature = None` is a creator reclaim.
pub fn claim_note(notes: Address, ephemeral_owner: Address, signature: Option<&Bytes>) -> Vec<Call> {
    let signature = match signature {
        Some(sig) => sig.to_vec(),
        None => SELF_RECLAIM_SIGNATURE.to_vec(),
    };
    vec![calls::claim_note(notes, ephemeral_owner, signature)]
}

/// Wrap a batch in an unsigned user operation.
pub fn user_operation(
    sender: Address,
    nonce: &Nonce,
    batch: Vec<Call>,
    gas: &ChainGasConstants,
    limits: &GasSettings,
) -> UserOperation {
    UserOperation {
        sender,
        nonce: nonce.to_u256(),
        init_code: Bytes::new(),
        call_data: calls::execute(batch),
        call_gas_limit: U256::from(limits.call_gas_limit),
        verification_gas_limit: U256::from(limits.verification_gas_limit),
        pre_verification_gas: gas.pre_verification_gas,
        max_fee_per_gas: gas.max_fee_per_gas,
        max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
        paymaster_and_data: gas.paymaster_and_data.clone(),
        signature: Bytes::new(),
    }
}
