//! Daimo contract call interface
//!
//! The account, ephemeral-notes and token contracts are treated as opaque
//! on-chain state machines. Only their ABI surface lives here.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};

sol! {
    /// A single call executed by the account contract.
    #[derive(Debug, PartialEq, Eq)]
    struct Call {
        address dest;
        uint256 value;
        bytes data;
    }

    /// Account contract. Every user operation targets `execute`.
    interface IDaimoAccount {
        function execute(Call[] calls) external;
        function addSigningKey(uint8 slot, bytes32[2] key) external;
        function removeSigningKey(uint8 slot) external;
    }

    /// Escrow for bearer payment links.
    interface IEphemeralNotes {
        function createNote(address ephemeralOwner, uint256 amount) external;
        function claimNote(address ephemeralOwner, bytes signature) external;
    }

    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}

/// Fixed signature submitted when the note creator reclaims their own note.
/// The notes contract skips signature checks when the caller is the creator,
/// so any other caller presenting it reverts.
pub const SELF_RECLAIM_SIGNATURE: [u8; 65] = [0u8; 65];

impl Call {
    pub fn new(dest: Address, data: Vec<u8>) -> Self {
        Self {
            dest,
            value: U256::ZERO,
            data: Bytes::from(data),
        }
    }
}

/// `token.transfer(to, amount)`
pub fn erc20_transfer(token: Address, to: Address, amount: U256) -> Call {
    Call::new(token, IERC20::transferCall { to, amount }.abi_encode())
}

/// `token.approve(spender, amount)`
pub fn erc20_approve(token: Address, spender: Address, amount: U256) -> Call {
    Call::new(token, IERC20::approveCall { spender, amount }.abi_encode())
}

/// Self-call registering a P-256 key `(x, y)` in `slot`.
pub fn add_signing_key(account: Address, slot: u8, key: [B256; 2]) -> Call {
    Call::new(
        account,
        IDaimoAccount::addSigningKeyCall { slot, key }.abi_encode(),
    )
}

pub fn remove_signing_key(account: Address, slot: u8) -> Call {
    Call::new(
        account,
        IDaimoAccount::removeSigningKeyCall { slot }.abi_encode(),
    )
}

pub fn create_note(notes: Address, ephemeral_owner: Address, amount: U256) -> Call {
    Call::new(
        notes,
        IEphemeralNotes::createNoteCall {
            ephemeralOwner: ephemeral_owner,
            amount,
        }
        .abi_encode(),
    )
}

pub fn claim_note(notes: Address, ephemeral_owner: Address, signature: Vec<u8>) -> Call {
    Call::new(
        notes,
        IEphemeralNotes::claimNoteCall {
            ephemeralOwner: ephemeral_owner,
            signature: Bytes::from(signature),
        }
        .abi_encode(),
    )
}

/// Wrap a batch into the account's `execute` call data. The batch executes
/// atomically: either every call lands or none does.
pub fn execute(calls: Vec<Call>) -> Bytes {
    Bytes::from(IDaimoAccount::executeCall { calls }.abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_round_trips_batch() {
        let token = Address::repeat_byte(0x11);
        let notes = Address::repeat_byte(0x22);
        let owner = Address::repeat_byte(0x33);
        let batch = vec![
            erc20_approve(token, notes, U256::MAX),
            create_note(notes, owner, U256::from(5_000_000u64)),
        ];

        let data = execute(batch.clone());
        let decoded = IDaimoAccount::executeCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.calls, batch);
    }

    #[test]
    fn test_transfer_selector() {
        let call = erc20_transfer(Address::ZERO, Address::ZERO, U256::from(1u8));
        // transfer(address,uint256)
        assert_eq!(hex::encode(&call.data[..4]), "a9059cbb");
    }
}
