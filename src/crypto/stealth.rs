//! One-time destination keys and amount encryption for committed outputs.
//!
//! For a recipient with stealth address `(S, D)` (scan and spend public keys)
//! the sender draws an ephemeral `r`, publishes `R = r·G` and derives
//! `t = Hs(r·S)`. The output key is `P = t·G + D`, the commitment blinding is
//! `Hs("blind", r·S)` and the amount is masked with `H("amount", r·S)`.
//! The recipient recomputes `r·S = s·R` and recognises `P`.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::crypto::commitment::Commitment;
use crate::crypto::{hash_to_scalar, PublicKey};
use crate::types::Amount;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StealthAddress {
    pub scan: PublicKey,
    pub spend: PublicKey,
}

/// Public data a recipient needs to recognise and open an output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthPayload {
    pub ephemeral: PublicKey,
    pub masked_value: u64,
}

pub struct DerivedOutput {
    pub one_time_key: PublicKey,
    pub blinding: Scalar,
    pub payload: StealthPayload,
}

/// A committed output opened with the wallet's scan key.
#[derive(Clone, Debug)]
pub struct OpenedOutput {
    pub value: Amount,
    pub blinding: Scalar,
    /// Added to the spend secret to obtain the one-time secret.
    pub tweak: Scalar,
}

struct SharedSecret([u8; 32]);

impl SharedSecret {
    fn new(point: &RistrettoPoint) -> Self {
        Self(point.compress().to_bytes())
    }

    fn tweak(&self) -> Scalar {
        hash_to_scalar(b"ringstake/stealth-tweak", &[&self.0])
    }

    fn blinding(&self) -> Scalar {
        hash_to_scalar(b"ringstake/stealth-blind", &[&self.0])
    }

    fn amount_mask(&self) -> u64 {
        let mask = hash_to_scalar(b"ringstake/stealth-amount", &[&self.0]).to_bytes();
        let mut word = [0u8; 8];
        word.copy_from_slice(&mask[..8]);
        u64::from_le_bytes(word)
    }
}

/// Returns `None` if either address key is not a valid point.
pub fn derive_output<R: RngCore + CryptoRng>(
    address: &StealthAddress,
    value: Amount,
    rng: &mut R,
) -> Option<DerivedOutput> {
    let scan = address.scan.point()?;
    let spend = address.spend.point()?;

    let r = Scalar::random(rng);
    let shared = SharedSecret::new(&(r * scan));
    let one_time = RistrettoPoint::mul_base(&shared.tweak()) + spend;

    Some(DerivedOutput {
        one_time_key: PublicKey::from_point(&one_time),
        blinding: shared.blinding(),
        payload: StealthPayload {
            ephemeral: PublicKey::from_point(&RistrettoPoint::mul_base(&r)),
            masked_value: value ^ shared.amount_mask(),
        },
    })
}

/// Trial-decrypts one committed output. `None` means not ours.
pub fn open_output(
    scan_secret: &Scalar,
    spend_public: &RistrettoPoint,
    one_time_key: &PublicKey,
    commitment: &Commitment,
    payload: &StealthPayload,
) -> Option<OpenedOutput> {
    let ephemeral = payload.ephemeral.point()?;
    let shared = SharedSecret::new(&(scan_secret * ephemeral));
    let tweak = shared.tweak();

    let expected = RistrettoPoint::mul_base(&tweak) + spend_public;
    if expected.compress().as_bytes() != one_time_key.as_bytes() {
        return None;
    }

    let value = payload.masked_value ^ shared.amount_mask();
    let blinding = shared.blinding();
    if Commitment::new(value, &blinding) != *commitment {
        return None;
    }

    Some(OpenedOutput {
        value,
        blinding,
        tweak,
    })
}
