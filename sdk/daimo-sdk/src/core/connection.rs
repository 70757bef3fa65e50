use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use daimo_interface::UserOperation;
use std::error::Error;

use crate::types::{BundleEvent, ChainGasConstants, NoteRecord, Receipt};

/// Bundler and RPC boundary.
///
/// `send_user_operation` returns the user-op hash as a handle;
/// `wait_for_bundle` resolves once a bundler has included it in a
/// transaction (not once it is final).
#[async_trait]
pub trait BundlerConnection: Send + Sync {
    async fn get_gas_constants(&self)
        -> Result<ChainGasConstants, Box<dyn Error + Send + Sync>>;

    async fn send_user_operation(
        &self,
        op: &UserOperation,
    ) -> Result<B256, Box<dyn Error + Send + Sync>>;

    async fn wait_for_bundle(
        &self,
        user_op_hash: &B256,
    ) -> Result<BundleEvent, Box<dyn Error + Send + Sync>>;

    /// `Ok(None)` while the transaction is unknown to the node.
    async fn get_transaction_receipt(
        &self,
        tx_hash: &B256,
    ) -> Result<Option<Receipt>, Box<dyn Error + Send + Sync>>;

    /// `Ok(None)` when no note is escrowed for `ephemeral_owner`, including
    /// after it has been claimed.
    async fn get_note(
        &self,
        ephemeral_owner: &Address,
    ) -> Result<Option<NoteRecord>, Box<dyn Error + Send + Sync>>;

    async fn get_allowance(
        &self,
        owner: &Address,
        spender: &Address,
    ) -> Result<U256, Box<dyn Error + Send + Sync>>;
}
