use alloy_primitives::B256;
use daimo_interface::{Nonce, NonceMetadata, NonceType};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Hands out one nonce per logical intent.
///
/// Nonces are memoized by intent fingerprint: asking again for the same
/// intent returns the same nonce, so rebuilding or retrying an operation
/// never orphans the original. Identifiers are random and never reissued
/// within a session, even after an intent is forgotten.
#[derive(Debug, Default)]
pub struct NonceAllocator {
    by_intent: HashMap<B256, Nonce>,
    identifiers: HashSet<u64>,
}

impl NonceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, nonce_type: NonceType, intent: B256) -> Nonce {
        if let Some(nonce) = self.by_intent.get(&intent) {
            return *nonce;
        }

        let mut rng = rand::thread_rng();
        let identifier = loop {
            let candidate: u64 = rng.gen();
            if self.identifiers.insert(candidate) {
                break candidate;
            }
        };

        let nonce = Nonce::new(NonceMetadata::new(nonce_type, identifier));
        debug!(?nonce_type, identifier, "allocated nonce");
        self.by_intent.insert(intent, nonce);
        nonce
    }

    /// Drop the memoized nonce for `intent`. The next allocation for the same
    /// intent gets a fresh value; the old identifier stays reserved.
    pub fn forget(&mut self, intent: &B256) -> Option<Nonce> {
        self.by_intent.remove(intent)
    }

    /// Drop whichever intent holds `nonce`, once chain sync has seen it
    /// spent. Returns whether an intent was released.
    pub fn release(&mut self, nonce: &Nonce) -> bool {
        let before = self.by_intent.len();
        self.by_intent.retain(|_, held| held != nonce);
        before != self.by_intent.len()
    }

    pub fn get(&self, intent: &B256) -> Option<Nonce> {
        self.by_intent.get(intent).copied()
    }
}
