use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::sync::atomic::{AtomicBool, Ordering};

use crate::crypto::stealth::StealthAddress;
use crate::crypto::{hash_to_scalar, PublicKey, SecretKey};
use crate::types::hex32;

/// How the spend key of an owned output is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyOrigin {
    /// index into the wallet's transparent key chain
    Transparent { index: u32 },
    /// stealth tweak added to the spend secret
    Stealth {
        #[serde(with = "hex32")]
        tweak: [u8; 32],
    },
}

impl KeyOrigin {
    pub fn stealth(tweak: &Scalar) -> Self {
        KeyOrigin::Stealth {
            tweak: tweak.to_bytes(),
        }
    }
}

/// Supplier of secret key material to the builder and to ingestion.
pub trait KeyStore: Send + Sync {
    /// `None` when the key is unavailable (store locked or origin unknown).
    fn derive_spend_key(&self, origin: &KeyOrigin) -> Option<SecretKey>;

    fn derive_stealth_scan_key(&self) -> Option<SecretKey>;

    fn transparent_public_key(&self, index: u32) -> PublicKey;

    fn stealth_address(&self) -> StealthAddress;
}

/// Deterministic key chain derived from a 32 byte seed.
pub struct SeedKeyStore {
    seed: [u8; 32],
    scan: Scalar,
    spend: Scalar,
    locked: AtomicBool,
}

impl SeedKeyStore {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            scan: hash_to_scalar(b"ringstake/scan", &[&seed]),
            spend: hash_to_scalar(b"ringstake/spend", &[&seed]),
            seed,
            locked: AtomicBool::new(false),
        }
    }

    /// Seed taken from the SHA-256 of a passphrase or mnemonic.
    pub fn from_phrase(phrase: &str) -> Self {
        Self::from_seed(Sha256::digest(phrase.as_bytes()).into())
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn transparent_scalar(&self, index: u32) -> Scalar {
        hash_to_scalar(
            b"ringstake/transparent",
            &[&self.seed, &index.to_le_bytes()],
        )
    }
}

impl KeyStore for SeedKeyStore {
    fn derive_spend_key(&self, origin: &KeyOrigin) -> Option<SecretKey> {
        if self.is_locked() {
            return None;
        }
        let scalar = match origin {
            KeyOrigin::Transparent { index } => self.transparent_scalar(*index),
            KeyOrigin::Stealth { tweak } => Scalar::from_bytes_mod_order(*tweak) + self.spend,
        };
        Some(SecretKey::from_scalar(scalar))
    }

    fn derive_stealth_scan_key(&self) -> Option<SecretKey> {
        if self.is_locked() {
            return None;
        }
        Some(SecretKey::from_scalar(self.scan))
    }

    fn transparent_public_key(&self, index: u32) -> PublicKey {
        SecretKey::from_scalar(self.transparent_scalar(index)).public_key()
    }

    fn stealth_address(&self) -> StealthAddress {
        StealthAddress {
            scan: SecretKey::from_scalar(self.scan).public_key(),
            spend: SecretKey::from_scalar(self.spend).public_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::keys::{KeyOrigin, KeyStore, SeedKeyStore};

    #[test]
    fn transparent_keys_match_public_chain() {
        let keys = SeedKeyStore::from_phrase("expect trouble pause odor utility palace");
        for index in 0..3 {
            let secret = keys
                .derive_spend_key(&KeyOrigin::Transparent { index })
                .unwrap();
            assert_eq!(secret.public_key(), keys.transparent_public_key(index));
        }
        assert_ne!(keys.transparent_public_key(0), keys.transparent_public_key(1));
    }

    #[test]
    fn locked_store_withholds_secrets() {
        let keys = SeedKeyStore::from_seed([4u8; 32]);
        keys.lock();
        assert!(keys.derive_stealth_scan_key().is_none());
        assert!(keys
            .derive_spend_key(&KeyOrigin::Transparent { index: 0 })
            .is_none());
        keys.unlock();
        assert!(keys.derive_stealth_scan_key().is_some());
    }

    #[test]
    fn seeds_give_distinct_stealth_addresses() {
        let a = SeedKeyStore::from_seed([1u8; 32]).stealth_address();
        let b = SeedKeyStore::from_seed([2u8; 32]).stealth_address();
        assert_ne!(a, b);
        assert_ne!(a.scan, a.spend);
    }
}
