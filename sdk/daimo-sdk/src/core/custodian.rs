use async_trait::async_trait;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::EncodePublicKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CustodianError {
    #[error("User cancelled authentication")]
    UserCancelled,

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("{0}")]
    Failure(String),
}

/// Where the custodian keeps its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareSecurityLevel {
    /// Dedicated secure element (Secure Enclave, StrongBox)
    SecureElement,
    /// Trusted execution environment
    TrustedEnvironment,
    /// Keys live in process memory
    Software,
}

/// Prompt text shown by the authentication dialog. Passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCopy {
    pub title: String,
    pub message: String,
}

/// Abstraction for a hardware-backed P-256 key store.
///
/// Public keys are DER-encoded SubjectPublicKeyInfo. Signatures are DER
/// ECDSA signatures over `SHA-256(payload)`. Every `sign` call may show an
/// authentication prompt and may therefore take arbitrarily long.
#[async_trait]
pub trait KeyCustodian: Send + Sync {
    async fn fetch_public_key(&self, name: &str) -> Result<Option<Vec<u8>>, CustodianError>;

    async fn sign(
        &self,
        name: &str,
        payload: &[u8],
        prompt: &PromptCopy,
    ) -> Result<Vec<u8>, CustodianError>;

    /// Create a key under `name`, returning its public key.
    async fn create_key_pair(&self, name: &str) -> Result<Vec<u8>, CustodianError>;

    async fn delete_key_pair(&self, name: &str) -> Result<(), CustodianError>;

    fn hardware_security_level(&self) -> HardwareSecurityLevel;
}

/// In-process custodian holding software P-256 keys.
///
/// Used by tests and headless tooling. Can simulate a user dismissing the
/// prompt and a slow human response.
#[derive(Default)]
pub struct MemoryKeyCustodian {
    keys: Mutex<HashMap<String, SigningKey>>,
    cancel_next: AtomicBool,
    sign_calls: AtomicUsize,
    prompt_delay: Option<Duration>,
}

impl MemoryKeyCustodian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = Some(delay);
        self
    }

    /// The next `sign` call behaves as if the user dismissed the prompt.
    pub fn cancel_next_prompt(&self) {
        self.cancel_next.store(true, Ordering::SeqCst);
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn insert_key(&self, name: &str, key: SigningKey) {
        self.lock_keys().insert(name.to_string(), key);
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.lock_keys().contains_key(name)
    }

    fn lock_keys(&self) -> std::sync::MutexGuard<'_, HashMap<String, SigningKey>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn public_key_der(key: &SigningKey) -> Result<Vec<u8>, CustodianError> {
        key.verifying_key()
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CustodianError::Failure(e.to_string()))
    }
}

#[async_trait]
impl KeyCustodian for MemoryKeyCustodian {
    async fn fetch_public_key(&self, name: &str) -> Result<Option<Vec<u8>>, CustodianError> {
        let key = self.lock_keys().get(name).cloned();
        key.as_ref().map(Self::public_key_der).transpose()
    }

    async fn sign(
        &self,
        name: &str,
        payload: &[u8],
        _prompt: &PromptCopy,
    ) -> Result<Vec<u8>, CustodianError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.prompt_delay {
            tokio::time::sleep(delay).await;
        }
        if self.cancel_next.swap(false, Ordering::SeqCst) {
            return Err(CustodianError::UserCancelled);
        }

        let key = self
            .lock_keys()
            .get(name)
            .cloned()
            .ok_or_else(|| CustodianError::KeyNotFound(name.to_string()))?;
        let signature: Signature = key.sign(payload);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    async fn create_key_pair(&self, name: &str) -> Result<Vec<u8>, CustodianError> {
        let key = SigningKey::random(&mut OsRng);
        let der = Self::public_key_der(&key)?;
        self.lock_keys().insert(name.to_string(), key);
        Ok(der)
    }

    async fn delete_key_pair(&self, name: &str) -> Result<(), CustodianError> {
        self.lock_keys().remove(name);
        Ok(())
    }

    fn hardware_security_level(&self) -> HardwareSecurityLevel {
        HardwareSecurityLevel::Software
    }
}
