use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use crate::crypto::commitment::Commitment;
use crate::crypto::{hash_to_scalar, scalar_from_bytes, value_generator};
use crate::types::Amount;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeProof(pub Vec<u8>);

/// Proof system attached to every committed output.
pub trait RangeProver: Send + Sync {
    fn prove(&self, commitment: &Commitment, value: Amount, blinding: &Scalar) -> RangeProof;

    fn verify(&self, commitment: &Commitment, proof: &RangeProof) -> bool;
}

/// Sigma proof of knowledge of a commitment opening `(v, r)`.
///
/// Shows the committer can open the commitment without revealing `v`; it
/// does not bound `v`. A Bulletproofs prover slots in behind the same trait.
#[derive(Default)]
pub struct OpeningProver;

impl OpeningProver {
    const PROOF_SIZE: usize = 96;

    fn challenge(commitment: &Commitment, nonce: &RistrettoPoint) -> Scalar {
        hash_to_scalar(
            b"ringstake/opening",
            &[commitment.as_bytes(), nonce.compress().as_bytes()],
        )
    }
}

impl RangeProver for OpeningProver {
    fn prove(&self, commitment: &Commitment, value: Amount, blinding: &Scalar) -> RangeProof {
        let mut rng = rand::thread_rng();
        let a = Scalar::random(&mut rng);
        let b = Scalar::random(&mut rng);
        let nonce = a * value_generator() + RistrettoPoint::mul_base(&b);
        let e = Self::challenge(commitment, &nonce);
        let z_value = a + e * Scalar::from(value);
        let z_blinding = b + e * blinding;

        let mut bytes = Vec::with_capacity(Self::PROOF_SIZE);
        bytes.extend_from_slice(nonce.compress().as_bytes());
        bytes.extend_from_slice(z_value.as_bytes());
        bytes.extend_from_slice(z_blinding.as_bytes());
        RangeProof(bytes)
    }

    fn verify(&self, commitment: &Commitment, proof: &RangeProof) -> bool {
        if proof.0.len() != Self::PROOF_SIZE {
            return false;
        }
        let mut chunks = [[0u8; 32]; 3];
        for (chunk, bytes) in chunks.iter_mut().zip(proof.0.chunks_exact(32)) {
            chunk.copy_from_slice(bytes);
        }
        let (nonce, z_value, z_blinding, point) = match (
            CompressedRistretto(chunks[0]).decompress(),
            scalar_from_bytes(&chunks[1]),
            scalar_from_bytes(&chunks[2]),
            commitment.point(),
        ) {
            (Some(n), Some(v), Some(b), Some(c)) => (n, v, b, c),
            _ => return false,
        };
        let e = Self::challenge(commitment, &nonce);
        let lhs = z_value * value_generator() + RistrettoPoint::mul_base(&z_blinding);
        lhs.compress() == (nonce + e * point).compress()
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::commitment::Commitment;
    use crate::crypto::range_proof::{OpeningProver, RangeProof, RangeProver};
    use curve25519_dalek::scalar::Scalar;

    #[test]
    fn opening_proof_binds_commitment() {
        let blinding = Scalar::random(&mut rand::thread_rng());
        let commitment = Commitment::new(500, &blinding);
        let prover = OpeningProver;
        let proof = prover.prove(&commitment, 500, &blinding);
        assert!(prover.verify(&commitment, &proof));

        let other = Commitment::new(501, &blinding);
        assert!(!prover.verify(&other, &proof));
        assert!(!prover.verify(&commitment, &RangeProof(vec![0u8; 10])));
    }
}
