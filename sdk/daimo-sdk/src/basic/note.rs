//! Ephemeral notes: payment links backed by an on-chain escrow
//!
//! The creator escrows funds under the address of a freshly generated
//! key and shares that key inside a link. Whoever holds the link can claim
//! by signing their own address with it. The creator can always take back
//! an unclaimed note without the key.

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::basic::actions::{ClaimAuth, Intent};
use crate::basic::wallet::{DaimoWallet, WalletSubmitter};
use crate::core::connection::BundlerConnection;
use crate::core::custodian::KeyCustodian;
use crate::core::ephemeral::EphemeralKey;
use crate::core::submitter::OperationSubmitter;
use crate::error::{DaimoSdkError, Result};
use crate::link::{DaimoLink, NoteLink};
use crate::types::NoteRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteStatus {
    Claimable(NoteRecord),
    /// The escrow is empty. Expected once a link has been used; not an error.
    AlreadyClaimed,
}

impl NoteStatus {
    pub fn claimable(self, ephemeral_owner: Address) -> Result<NoteRecord> {
        match self {
            NoteStatus::Claimable(record) => Ok(record),
            NoteStatus::AlreadyClaimed => Err(DaimoSdkError::AlreadyClaimed(ephemeral_owner)),
        }
    }
}

pub enum ClaimOutcome<C, K: KeyCustodian> {
    /// Nothing to claim. No operation was built.
    AlreadyClaimed,
    Ready(WalletSubmitter<C, K, NoteRecord>),
}

impl<C, K: KeyCustodian> std::fmt::Debug for ClaimOutcome<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimOutcome::AlreadyClaimed => f.write_str("AlreadyClaimed"),
            ClaimOutcome::Ready(s) => f.debug_tuple("Ready").field(s).finish(),
        }
    }
}

impl<C, K> DaimoWallet<C, K>
where
    C: BundlerConnection,
    K: KeyCustodian + 'static,
{
    /// Prepare a note funding a new ephemeral key with `amount`.
    ///
    /// The bearer link comes back only in the exec outcome. Status
    /// subscribers see the keyless owner link.
    pub async fn create_note(&self, amount: U256) -> Result<WalletSubmitter<C, K, DaimoLink>> {
        let (sender, signer) = self.device_signer().await?;
        let notes = self.ctx.config.chain.notes_contract;

        let allowance = self
            .ctx
            .connection
            .get_allowance(&sender, &notes)
            .await
            .map_err(|e| DaimoSdkError::Connection(e.to_string()))?;
        let needs_approval = allowance < amount;
        let gas = self.gas().await?;

        let key = EphemeralKey::generate();
        let ephemeral_owner = key.address();
        info!(%ephemeral_owner, needs_approval, "note prepared");

        let link = DaimoLink::Note(NoteLink::Bearer {
            key,
            amount_hint: Some(amount),
        });
        let public = DaimoLink::Note(NoteLink::Owner { ephemeral_owner });
        Ok(OperationSubmitter::new(
            self.ctx.clone(),
            signer,
            sender,
            Intent::CreateNote {
                ephemeral_owner,
                amount,
                needs_approval,
            },
            gas,
        )
        .with_secret_success_data(link, public))
    }

    pub async fn fetch_note_status(&self, note: &NoteLink) -> Result<NoteStatus> {
        let ephemeral_owner = note.ephemeral_owner();
        let record = self
            .ctx
            .connection
            .get_note(&ephemeral_owner)
            .await
            .map_err(|e| DaimoSdkError::Connection(e.to_string()))?;

        Ok(match record {
            Some(record) => NoteStatus::Claimable(record),
            None => NoteStatus::AlreadyClaimed,
        })
    }

    /// Prepare a claim of `note` into this wallet's account.
    ///
    /// Bearer links prove possession with an ephemeral-key signature over
    /// the account address. Owner links carry no key and only work for the
    /// note's creator, which is checked here before anything is signed.
    pub async fn claim_note(&self, note: &NoteLink) -> Result<ClaimOutcome<C, K>> {
        let (sender, signer) = self.device_signer().await?;
        let ephemeral_owner = note.ephemeral_owner();

        let record = match self.fetch_note_status(note).await? {
            NoteStatus::Claimable(record) => record,
            NoteStatus::AlreadyClaimed => {
                info!(%ephemeral_owner, "note already claimed");
                return Ok(ClaimOutcome::AlreadyClaimed);
            },
        };

        let auth = match note {
            NoteLink::Bearer { key, .. } => ClaimAuth::Ephemeral(key.sign_claim(&sender)?),
            NoteLink::Owner { .. } if record.from == sender => ClaimAuth::SelfReclaim,
            NoteLink::Owner { .. } => return Err(DaimoSdkError::NotNoteCreator(ephemeral_owner)),
        };
        let gas = self.gas().await?;

        info!(
            %ephemeral_owner,
            self_reclaim = matches!(auth, ClaimAuth::SelfReclaim),
            "claim prepared"
        );
        Ok(ClaimOutcome::Ready(
            OperationSubmitter::new(
                self.ctx.clone(),
                signer,
                sender,
                Intent::ClaimNote {
                    ephemeral_owner,
                    from: record.from,
                    amount: record.amount,
                    auth,
                },
                gas,
            )
            .with_success_data(record),
        ))
    }
}
