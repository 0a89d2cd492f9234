use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::crypto::value_generator;
use crate::types::{hex32, Amount};

/// Secret opening scalar of a commitment, stored in wallet records.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindingFactor(#[serde(with = "hex32")] [u8; 32]);

impl BlindingFactor {
    pub const ZERO: BlindingFactor = BlindingFactor([0u8; 32]);

    pub fn from_scalar(scalar: &Scalar) -> Self {
        Self(scalar.to_bytes())
    }

    pub fn scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.0)
    }
}

impl fmt::Debug for BlindingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlindingFactor(..)")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "hex32")] pub [u8; 32]);

impl Commitment {
    pub fn new(value: Amount, blinding: &Scalar) -> Self {
        Self(commit_point(value, blinding).compress().to_bytes())
    }

    /// Commitment to a publicly known value.
    pub fn transparent(value: Amount) -> Self {
        Self::new(value, &Scalar::ZERO)
    }

    pub fn point(&self) -> Option<RistrettoPoint> {
        CompressedRistretto(self.0).decompress()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", &hex::encode(self.0)[..16])
    }
}

pub fn commit_point(value: Amount, blinding: &Scalar) -> RistrettoPoint {
    Scalar::from(value) * value_generator() + RistrettoPoint::mul_base(blinding)
}

/// `sum(outputs) + fee·H - sum(inputs)`; equals `excess·G` for a balanced
/// transaction whose output blindings exceed the input blindings by `excess`.
pub fn commitment_excess(
    inputs: &[RistrettoPoint],
    outputs: &[RistrettoPoint],
    fee: Amount,
) -> RistrettoPoint {
    let inputs: RistrettoPoint = inputs.iter().sum();
    let outputs: RistrettoPoint = outputs.iter().sum();
    outputs + Scalar::from(fee) * value_generator() - inputs
}

pub fn verify_commitment_sum(
    inputs: &[RistrettoPoint],
    outputs: &[RistrettoPoint],
    fee: Amount,
    excess: &RistrettoPoint,
) -> bool {
    commitment_excess(inputs, outputs, fee).compress() == excess.compress()
}

#[cfg(test)]
mod tests {
    use crate::crypto::commitment::{commit_point, verify_commitment_sum, Commitment};
    use curve25519_dalek::ristretto::RistrettoPoint;
    use curve25519_dalek::scalar::Scalar;

    #[test]
    fn commitments_are_additive() {
        let mut rng = rand::thread_rng();
        let a = Scalar::random(&mut rng);
        let b = Scalar::random(&mut rng);
        let sum = commit_point(30, &a) + commit_point(12, &b);
        assert_eq!(sum.compress(), commit_point(42, &(a + b)).compress());
    }

    #[test]
    fn balanced_set_verifies() {
        let mut rng = rand::thread_rng();
        let r_in = Scalar::random(&mut rng);
        let r_out_a = Scalar::random(&mut rng);
        let r_out_b = Scalar::random(&mut rng);
        let inputs = vec![commit_point(100, &r_in), commit_point(50, &Scalar::ZERO)];
        let outputs = vec![commit_point(120, &r_out_a), commit_point(27, &r_out_b)];
        let excess = RistrettoPoint::mul_base(&(r_out_a + r_out_b - r_in));

        assert!(verify_commitment_sum(&inputs, &outputs, 3, &excess));
        assert!(!verify_commitment_sum(&inputs, &outputs, 4, &excess));
    }

    #[test]
    fn transparent_commitment_has_zero_blinding() {
        assert_eq!(
            Commitment::transparent(5).point().unwrap().compress(),
            commit_point(5, &Scalar::ZERO).compress()
        );
    }
}
