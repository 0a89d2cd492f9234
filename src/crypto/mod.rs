//! Curve primitives for the three output privacy levels.
//!
//! Everything is built over the Ristretto group: `G` is the standard base
//! point and `H` an independent generator derived by hashing, so a commitment
//! `v·H + r·G` hides `v` and balances additively across a transaction.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use std::fmt;
use std::sync::OnceLock;

use crate::types::hex32;

pub mod commitment;
pub mod keys;
pub mod range_proof;
pub mod signature;
pub mod stealth;

pub(crate) fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    Scalar::from_hash(hasher)
}

pub(crate) fn hash_to_point(domain: &[u8], data: &[u8]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    hasher.update(data);
    RistrettoPoint::from_hash(hasher)
}

/// Generator the committed value is multiplied with.
pub fn value_generator() -> &'static RistrettoPoint {
    static H: OnceLock<RistrettoPoint> = OnceLock::new();
    H.get_or_init(|| hash_to_point(b"ringstake/value-generator", b"H"))
}

pub(crate) fn scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_canonical_bytes(*bytes))
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex32")] pub [u8; 32]);

impl PublicKey {
    pub fn from_point(point: &RistrettoPoint) -> Self {
        Self(point.compress().to_bytes())
    }

    pub fn point(&self) -> Option<RistrettoPoint> {
        CompressedRistretto(self.0).decompress()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Clone)]
pub struct SecretKey(pub(crate) Scalar);

impl SecretKey {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(Scalar::random(rng))
    }

    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }

    pub fn scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(&RistrettoPoint::mul_base(&self.0))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::{value_generator, PublicKey, SecretKey};
    use curve25519_dalek::ristretto::RistrettoPoint;

    #[test]
    fn value_generator_is_not_base() {
        let base = RistrettoPoint::mul_base(&curve25519_dalek::scalar::Scalar::ONE);
        assert_ne!(value_generator().compress(), base.compress());
        assert_eq!(value_generator(), value_generator());
    }

    #[test]
    fn public_key_roundtrips_through_point() {
        let secret = SecretKey::random(&mut rand::thread_rng());
        let public = secret.public_key();
        let point = public.point().unwrap();
        assert_eq!(PublicKey::from_point(&point), public);
        assert!(PublicKey([0xffu8; 32]).point().is_none());
    }
}
