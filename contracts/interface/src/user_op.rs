//! ERC-4337 v0.6 user operation envelope

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// The hash the account's signing key commits to. Binds the operation to
    /// one entry point and one chain.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode();

        keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
    }

    /// Maximum gas the operation may be charged for.
    pub fn total_gas(&self) -> U256 {
        self.call_gas_limit + self.verification_gas_limit + self.pre_verification_gas
    }
}
