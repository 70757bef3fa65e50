use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use daimo_interface::AccountSignature;
use p256::ecdsa::Signature;
use std::sync::Arc;
use tracing::debug;

use crate::core::custodian::{KeyCustodian, PromptCopy};
use crate::error::{DaimoSdkError, Result};
use crate::utils::now_unix;

/// Produces the signature the account contract verifies for a user op.
///
/// Three outcomes are kept apart: a usable signature,
/// [`DaimoSdkError::UserCancelled`], and custodian failures such as
/// [`DaimoSdkError::KeyNotFound`].
#[async_trait]
pub trait SigningCallback: Send + Sync {
    /// Fail early if the signing key is gone, before anything is built.
    async fn ensure_key(&self) -> Result<()> {
        Ok(())
    }

    async fn sign(&self, message: &[u8]) -> Result<Bytes>;
}

/// Signs with the device key held by a [`KeyCustodian`].
pub struct DeviceSigner<K: KeyCustodian> {
    custodian: Arc<K>,
    key_name: String,
    key_slot: u8,
    prompt: PromptCopy,
    /// Signature lifetime from the moment of signing; 0 never expires
    valid_for_secs: u64,
}

impl<K: KeyCustodian> DeviceSigner<K> {
    pub fn new(custodian: Arc<K>, key_name: impl Into<String>, key_slot: u8) -> Self {
        Self {
            custodian,
            key_name: key_name.into(),
            key_slot,
            prompt: PromptCopy::default(),
            valid_for_secs: 0,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptCopy) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_validity(mut self, valid_for_secs: u64) -> Self {
        self.valid_for_secs = valid_for_secs;
        self
    }

    pub fn key_slot(&self) -> u8 {
        self.key_slot
    }
}

#[async_trait]
impl<K: KeyCustodian> SigningCallback for DeviceSigner<K> {
    async fn ensure_key(&self) -> Result<()> {
        match self.custodian.fetch_public_key(&self.key_name).await? {
            Some(_) => Ok(()),
            None => Err(DaimoSdkError::KeyNotFound(self.key_name.clone())),
        }
    }

    async fn sign(&self, message: &[u8]) -> Result<Bytes> {
        debug!(key_slot = self.key_slot, "requesting device signature");
        let der = self
            .custodian
            .sign(&self.key_name, message, &self.prompt)
            .await?;
        let valid_until = match self.valid_for_secs {
            0 => 0,
            secs => now_unix() + secs,
        };
        pack_der_signature(&der, self.key_slot, valid_until)
    }
}

/// Convert a DER P-256 signature to the packed account format. High-s
/// signatures are folded to low-s; the on-chain verifier rejects the former.
pub fn pack_der_signature(der: &[u8], key_slot: u8, valid_until: u64) -> Result<Bytes> {
    let signature = Signature::from_der(der)
        .map_err(|e| DaimoSdkError::Custodian(format!("malformed signature: {}", e)))?;
    let signature = signature.normalize_s().unwrap_or(signature);
    let (r, s) = signature.split_bytes();

    let packed = AccountSignature {
        valid_until,
        key_slot,
        r: B256::from_slice(&r),
        s: B256::from_slice(&s),
    }
    .encode()?;
    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::custodian::MemoryKeyCustodian;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{SigningKey, VerifyingKey};
    use p256::elliptic_curve::scalar::IsHigh;
    use std::time::Duration;

    #[tokio::test]
    async fn test_device_signer_packs_low_s_signature() {
        let custodian = Arc::new(MemoryKeyCustodian::new());
        custodian.create_key_pair("device").await.unwrap();
        let signer = DeviceSigner::new(custodian.clone(), "device", 3);

        let packed = signer.sign(b"user op hash").await.unwrap();
        let decoded = AccountSignature::decode(&packed).unwrap();
        assert_eq!(decoded.key_slot, 3);
        assert_eq!(decoded.valid_until, 0);

        let sig = Signature::from_scalars(decoded.r.0, decoded.s.0).unwrap();
        assert!(!bool::from(sig.s().is_high()));
    }

    #[test]
    fn test_high_s_is_normalized() {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let sig: Signature = p256::ecdsa::signature::Signer::sign(&key, b"payload");
        let low = sig.normalize_s().unwrap_or(sig);
        // High-s twin: s' = n - s
        let (r, _) = low.split_bytes();
        let s_high: p256::Scalar = -*low.s().as_ref();
        let high = Signature::from_scalars(r, s_high).unwrap();
        assert!(bool::from(high.s().is_high()));

        let packed = pack_der_signature(high.to_der().as_bytes(), 0, 0).unwrap();
        let decoded = AccountSignature::decode(&packed).unwrap();
        let restored = Signature::from_scalars(decoded.r.0, decoded.s.0).unwrap();

        assert_eq!(restored, low);
        let vk = VerifyingKey::from(&key);
        assert!(vk.verify(b"payload", &restored).is_ok());
    }

    #[tokio::test]
    async fn test_validity_starts_at_signing_time() {
        let custodian =
            Arc::new(MemoryKeyCustodian::new().with_prompt_delay(Duration::from_millis(1100)));
        custodian.create_key_pair("device").await.unwrap();
        let signer = DeviceSigner::new(custodian, "device", 0).with_validity(60);

        let prepared_at = now_unix();
        let packed = signer.sign(b"x").await.unwrap();
        let decoded = AccountSignature::decode(&packed).unwrap();
        assert!(decoded.valid_until >= prepared_at + 61);
        assert!(decoded.valid_until <= now_unix() + 60);
    }

    #[tokio::test]
    async fn test_cancel_is_distinct() {
        let custodian = Arc::new(MemoryKeyCustodian::new());
        custodian.create_key_pair("device").await.unwrap();
        custodian.cancel_next_prompt();
        let signer = DeviceSigner::new(custodian, "device", 0);

        assert!(matches!(
            signer.sign(b"x").await,
            Err(DaimoSdkError::UserCancelled)
        ));
    }

    #[tokio::test]
    async fn test_missing_key_detected_before_signing() {
        let custodian = Arc::new(MemoryKeyCustodian::new());
        let signer = DeviceSigner::new(custodian.clone(), "gone", 0);

        assert!(matches!(
            signer.ensure_key().await,
            Err(DaimoSdkError::KeyNotFound(name)) if name == "gone"
        ));
        assert_eq!(custodian.sign_calls(), 0);
    }
}
