use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use daimo_interface::calls::Call;
use daimo_interface::{Nonce, NonceType, UserOperation};

use crate::account::OpEvent;
use crate::advanced::instructions;
use crate::config::{GasSettings, SdkConfig};
use crate::error::{DaimoSdkError, Result};
use crate::types::ChainGasConstants;

/// How a claim proves it may take the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimAuth {
    /// Ephemeral-key signature over the claimant's address
    Ephemeral(Bytes),
    /// Creator taking back an unclaimed note
    SelfReclaim,
}

/// What the user asked for. Each variant carries only what its call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Transfer {
        to: Address,
        amount: U256,
    },
    AddKey {
        slot: u8,
        key: [B256; 2],
    },
    RemoveKey {
        slot: u8,
    },
    CreateNote {
        ephemeral_owner: Address,
        amount: U256,
        needs_approval: bool,
    },
    ClaimNote {
        ephemeral_owner: Address,
        /// Note creator, as read from chain
        from: Address,
        amount: U256,
        auth: ClaimAuth,
    },
}

impl Intent {
    pub fn nonce_type(&self) -> NonceType {
        match self {
            Intent::Transfer { .. } => NonceType::Transfer,
            Intent::AddKey { .. } => NonceType::AddKey,
            Intent::RemoveKey { .. } => NonceType::RemoveKey,
            Intent::CreateNote { .. } => NonceType::CreateNote,
            Intent::ClaimNote { .. } => NonceType::ClaimNote,
        }
    }

    /// Stable identity of the intent, used to memoize its nonce.
    ///
    /// Covers only the inputs that define the intent. Derived details such
    /// as the approval flag or the claim signature do not change it.
    pub fn fingerprint(&self) -> B256 {
        let mut buf = vec![self.nonce_type() as u8];
        match self {
            Intent::Transfer { to, amount } => {
                buf.extend_from_slice(to.as_slice());
                buf.extend_from_slice(&amount.to_be_bytes::<32>());
            },
            Intent::AddKey { slot, key } => {
                buf.push(*slot);
                buf.extend_from_slice(key[0].as_slice());
                buf.extend_from_slice(key[1].as_slice());
            },
            Intent::RemoveKey { slot } => buf.push(*slot),
            Intent::CreateNote {
                ephemeral_owner, ..
            }
            | Intent::ClaimNote {
                ephemeral_owner, ..
            } => buf.extend_from_slice(ephemeral_owner.as_slice()),
        }
        keccak256(buf)
    }

    /// Token units leaving the account, excluding fees.
    pub fn outgoing_amount(&self) -> U256 {
        match self {
            Intent::Transfer { amount, .. } | Intent::CreateNote { amount, .. } => *amount,
            Intent::AddKey { .. } | Intent::RemoveKey { .. } | Intent::ClaimNote { .. } => {
                U256::ZERO
            },
        }
    }

    /// History event for an operation sent by `sender`.
    pub fn op_event(&self, sender: Address) -> OpEvent {
        match self {
            Intent::Transfer { to, amount } => OpEvent::Transfer {
                from: sender,
                to: *to,
                amount: *amount,
            },
            Intent::AddKey { slot, .. } => OpEvent::AddKey { slot: *slot },
            Intent::RemoveKey { slot } => OpEvent::RemoveKey { slot: *slot },
            Intent::CreateNote {
                ephemeral_owner,
                amount,
                ..
            } => OpEvent::CreateNote {
                from: sender,
                ephemeral_owner: *ephemeral_owner,
                amount: *amount,
            },
            Intent::ClaimNote {
                ephemeral_owner,
                from,
                amount,
                ..
            } => OpEvent::ClaimNote {
                ephemeral_owner: *ephemeral_owner,
                from: *from,
                to: sender,
                amount: *amount,
            },
        }
    }
}

/// Turns intents into unsigned user operations for one account.
///
/// Pure: everything it needs (contract addresses, gas limits, the gas
/// snapshot, the nonce) is passed in.
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    sender: Address,
    token: Address,
    notes_contract: Address,
    limits: GasSettings,
}

impl OperationBuilder {
    pub fn new(sender: Address, config: &SdkConfig) -> Self {
        Self {
            sender,
            token: config.chain.token,
            notes_contract: config.chain.notes_contract,
            limits: config.gas.clone(),
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn calls(&self, intent: &Intent) -> Result<Vec<Call>> {
        let calls = match intent {
            Intent::Transfer { to, amount } => {
                if amount.is_zero() {
                    return Err(DaimoSdkError::Build("transfer amount is zero".to_string()));
                }
                if *to == Address::ZERO || *to == self.sender {
                    return Err(DaimoSdkError::Build(format!("invalid recipient {}", to)));
                }
                instructions::transfer(self.token, *to, *amount)
            },
            Intent::AddKey { slot, key } => instructions::add_key(self.sender, *slot, *key),
            Intent::RemoveKey { slot } => instructions::remove_key(self.sender, *slot),
            Intent::CreateNote {
                ephemeral_owner,
                amount,
                needs_approval,
            } => {
                if amount.is_zero() {
                    return Err(DaimoSdkError::Build("note amount is zero".to_string()));
                }
                instructions::create_note(
                    self.token,
                    self.notes_contract,
                    *ephemeral_owner,
                    *amount,
                    *needs_approval,
                )
            },
            Intent::ClaimNote {
                ephemeral_owner,
                auth,
                ..
            } => {
                let signature = match auth {
                    ClaimAuth::Ephemeral(sig) => Some(sig),
                    ClaimAuth::SelfReclaim => None,
                };
                instructions::claim_note(self.notes_contract, *ephemeral_owner, signature)
            },
        };
        Ok(calls)
    }

    pub fn build(
        &self,
        intent: &Intent,
        nonce: &Nonce,
        gas: &ChainGasConstants,
    ) -> Result<UserOperation> {
        if nonce.nonce_type() != intent.nonce_type() {
            return Err(DaimoSdkError::Build(format!(
                "nonce type {:?} does not match {:?} intent",
                nonce.nonce_type(),
                intent.nonce_type()
            )));
        }
        let calls = self.calls(intent)?;
        Ok(instructions::user_operation(
            self.sender,
            nonce,
            calls,
            gas,
            &self.limits,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daimo_interface::NonceMetadata;

    fn builder() -> OperationBuilder {
        let mut config = SdkConfig::default();
        config.chain.notes_contract = Address::repeat_byte(0x22);
        OperationBuilder::new(Address::repeat_byte(0xa1), &config)
    }

    fn gas() -> ChainGasConstants {
        ChainGasConstants {
            max_fee_per_gas: U256::from(1u64),
            max_priority_fee_per_gas: U256::from(1u64),
            pre_verification_gas: U256::from(1u64),
            paymaster_and_data: Bytes::new(),
            estimated_fee_dollars: 0.0,
        }
    }

    #[test]
    fn test_fingerprint_ignores_derived_fields() {
        let owner = Address::repeat_byte(3);
        let with_approval = Intent::CreateNote {
            ephemeral_owner: owner,
            amount: U256::from(5u64),
            needs_approval: true,
        };
        let without = Intent::CreateNote {
            ephemeral_owner: owner,
            amount: U256::from(5u64),
            needs_approval: false,
        };
        assert_eq!(with_approval.fingerprint(), without.fingerprint());

        let a = Intent::Transfer {
            to: owner,
            amount: U256::from(5u64),
        };
        let b = Intent::Transfer {
            to: owner,
            amount: U256::from(6u64),
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_build_rejects_mismatched_nonce() {
        let intent = Intent::RemoveKey { slot: 1 };
        let nonce = Nonce::new(NonceMetadata::new(NonceType::AddKey, 1));
        assert!(matches!(
            builder().build(&intent, &nonce, &gas()),
            Err(DaimoSdkError::Build(_))
        ));

        let nonce = Nonce::new(NonceMetadata::new(NonceType::RemoveKey, 1));
        assert!(builder().build(&intent, &nonce, &gas()).is_ok());
    }

    #[test]
    fn test_build_rejects_empty_transfer() {
        let intent = Intent::Transfer {
            to: Address::repeat_byte(5),
            amount: U256::ZERO,
        };
        let nonce = Nonce::new(NonceMetadata::new(NonceType::Transfer, 1));
        assert!(builder().build(&intent, &nonce, &gas()).is_err());
    }

    #[test]
    fn test_claim_event_credits_sender() {
        let intent = Intent::ClaimNote {
            ephemeral_owner: Address::repeat_byte(3),
            from: Address::repeat_byte(4),
            amount: U256::from(7u64),
            auth: ClaimAuth::SelfReclaim,
        };
        let sender = Address::repeat_byte(4);
        assert_eq!(intent.outgoing_amount(), U256::ZERO);
        assert_eq!(
            intent.op_event(sender),
            OpEvent::ClaimNote {
                ephemeral_owner: Address::repeat_byte(3),
                from: Address::repeat_byte(4),
                to: sender,
                amount: U256::from(7u64),
            }
        );
    }
}
