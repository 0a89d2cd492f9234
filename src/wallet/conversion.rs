//! Cryptographic material that bridges privacy levels inside one
//! transaction: output commitments and stealth payloads, pseudo commitments
//! and decoy rings for anonymous inputs, and the balance excess.

use std::collections::BTreeSet;

use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, Rng, RngCore};
use tracing::debug;

use crate::chain::AnonSet;
use crate::crypto::commitment::Commitment;
use crate::crypto::range_proof::RangeProver;
use crate::crypto::signature::RingMember;
use crate::crypto::stealth::derive_output;
use crate::error::WalletError;
use crate::tx::{BlindOutput, PlainOutput, TxOutput};
use crate::types::{Amount, OutputType};
use crate::wallet::descriptor::Destination;

/// An output ready for the transaction, with the opening the sender keeps.
pub struct PreparedOutput {
    pub output: TxOutput,
    pub value: Amount,
    /// zero for transparent outputs
    pub blinding: Scalar,
}

/// Decoys plus the real spend, sorted by anon-set index.
pub struct Ring {
    pub indices: Vec<u64>,
    pub real_position: usize,
    pub members: Vec<crate::chain::AnonMember>,
}

impl Ring {
    /// Ring rows against the spender's pseudo commitment.
    pub fn signing_members(&self, pseudo: &Commitment) -> Result<Vec<RingMember>, WalletError> {
        let pseudo = pseudo
            .point()
            .ok_or_else(|| WalletError::SigningFailed("invalid pseudo commitment".to_string()))?;
        self.members
            .iter()
            .zip(self.indices.iter())
            .map(|(member, index)| {
                match (member.one_time_key.point(), member.commitment.point()) {
                    (Some(key), Some(commitment)) => Ok(RingMember {
                        key,
                        commitment_delta: commitment - pseudo,
                    }),
                    _ => Err(WalletError::SigningFailed(format!(
                        "ring member {} is not a valid point",
                        index
                    ))),
                }
            })
            .collect()
    }
}

pub struct PrivacyConverter<'a, A: AnonSet + ?Sized> {
    anon: &'a A,
    prover: &'a dyn RangeProver,
}

impl<'a, A: AnonSet + ?Sized> PrivacyConverter<'a, A> {
    pub fn new(anon: &'a A, prover: &'a dyn RangeProver) -> Self {
        Self { anon, prover }
    }

    pub fn prepare_output<R: RngCore + CryptoRng>(
        &self,
        destination: &Destination,
        output_type: OutputType,
        value: Amount,
        rng: &mut R,
    ) -> Result<PreparedOutput, WalletError> {
        let mismatch = || WalletError::InvalidDestinationForType {
            output_type,
            reason: destination.kind().to_string(),
        };
        match (output_type, destination) {
            (OutputType::Transparent, Destination::Transparent(address)) => Ok(PreparedOutput {
                output: TxOutput::Transparent(PlainOutput {
                    address: *address,
                    value,
                }),
                value,
                blinding: Scalar::ZERO,
            }),
            (OutputType::Hidden | OutputType::Anonymous, Destination::Stealth(address)) => {
                let derived = derive_output(address, value, rng).ok_or_else(mismatch)?;
                let commitment = Commitment::new(value, &derived.blinding);
                let blind = BlindOutput {
                    one_time_key: derived.one_time_key,
                    commitment,
                    stealth: derived.payload,
                    range_proof: self.prover.prove(&commitment, value, &derived.blinding),
                };
                let output = if output_type == OutputType::Hidden {
                    TxOutput::Hidden(blind)
                } else {
                    TxOutput::Anonymous(blind)
                };
                Ok(PreparedOutput {
                    output,
                    value,
                    blinding: derived.blinding,
                })
            }
            _ => Err(mismatch()),
        }
    }

    /// Fresh recommitment of an anonymous input's value.
    pub fn pseudo_commitment<R: RngCore + CryptoRng>(
        &self,
        value: Amount,
        rng: &mut R,
    ) -> (Commitment, Scalar) {
        let blinding = Scalar::random(rng);
        (Commitment::new(value, &blinding), blinding)
    }

    /// Draws `ring_size - 1` distinct decoys uniformly from the anon set.
    pub fn select_ring<R: RngCore>(
        &self,
        real_index: u64,
        ring_size: usize,
        rng: &mut R,
    ) -> Result<Ring, WalletError> {
        let ring_size = ring_size.max(1);
        let available = self.anon.anon_count();
        if available < ring_size as u64 || real_index >= available {
            return Err(WalletError::DecoySetExhausted {
                needed: ring_size,
                decoys: ring_size - 1,
                available,
            });
        }

        let mut indices = BTreeSet::new();
        indices.insert(real_index);
        while indices.len() < ring_size {
            indices.insert(rng.gen_range(0..available));
        }
        let indices: Vec<u64> = indices.into_iter().collect();
        let real_position = indices
            .iter()
            .position(|i| *i == real_index)
            .ok_or_else(|| WalletError::SigningFailed("real member missing from ring".to_string()))?;
        let members = indices
            .iter()
            .map(|index| {
                self.anon.anon_member(*index).ok_or(WalletError::DecoySetExhausted {
                    needed: ring_size,
                    decoys: ring_size - 1,
                    available,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!("ring {:?}, real at {}", indices, real_position);
        Ok(Ring {
            indices,
            real_position,
            members,
        })
    }
}

/// `Σ output blindings - Σ input blindings`, the discrete log of the
/// published excess.
pub fn kernel_excess(inputs: &[Scalar], outputs: &[Scalar]) -> Scalar {
    let inputs: Scalar = inputs.iter().sum();
    let outputs: Scalar = outputs.iter().sum();
    outputs - inputs
}

#[cfg(test)]
mod tests {
    use curve25519_dalek::ristretto::RistrettoPoint;
    use curve25519_dalek::scalar::Scalar;

    use crate::chain::{AnonMember, AnonSet};
    use crate::crypto::commitment::{commitment_excess, Commitment};
    use crate::crypto::range_proof::{OpeningProver, RangeProver};
    use crate::crypto::stealth::StealthAddress;
    use crate::crypto::SecretKey;
    use crate::error::WalletError;
    use crate::types::{OutPoint, OutputType};
    use crate::wallet::conversion::{kernel_excess, PrivacyConverter};
    use crate::wallet::descriptor::Destination;

    struct FakeAnonSet(Vec<AnonMember>);

    impl AnonSet for FakeAnonSet {
        fn anon_count(&self) -> u64 {
            self.0.len() as u64
        }

        fn anon_member(&self, index: u64) -> Option<AnonMember> {
            self.0.get(index as usize).copied()
        }

        fn anon_index_of(&self, _outpoint: &OutPoint) -> Option<u64> {
            None
        }
    }

    fn anon_set(size: usize) -> FakeAnonSet {
        let mut rng = rand::thread_rng();
        FakeAnonSet(
            (0..size)
                .map(|_| AnonMember {
                    one_time_key: SecretKey::random(&mut rng).public_key(),
                    commitment: Commitment::new(1, &Scalar::random(&mut rng)),
                })
                .collect(),
        )
    }

    #[test]
    fn ring_contains_real_member_once() {
        let set = anon_set(20);
        let converter = PrivacyConverter::new(&set, &OpeningProver);
        for real in [0u64, 7, 19] {
            let ring = converter
                .select_ring(real, 5, &mut rand::thread_rng())
                .unwrap();
            assert_eq!(ring.indices.len(), 5);
            assert_eq!(ring.indices[ring.real_position], real);
            assert!(ring.indices.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(ring.members[ring.real_position], set.0[real as usize]);
        }
    }

    #[test]
    fn ring_larger_than_set_is_exhausted() {
        let set = anon_set(4);
        let converter = PrivacyConverter::new(&set, &OpeningProver);
        let result = converter.select_ring(0, 5, &mut rand::thread_rng());
        assert!(matches!(
            result,
            Err(WalletError::DecoySetExhausted {
                needed: 5,
                decoys: 4,
                available: 4
            })
        ));
        assert!(converter.select_ring(0, 4, &mut rand::thread_rng()).is_ok());
    }

    #[test]
    fn hidden_output_commits_and_proves() {
        let mut rng = rand::thread_rng();
        let set = anon_set(0);
        let converter = PrivacyConverter::new(&set, &OpeningProver);
        let address = StealthAddress {
            scan: SecretKey::random(&mut rng).public_key(),
            spend: SecretKey::random(&mut rng).public_key(),
        };
        let prepared = converter
            .prepare_output(&Destination::Stealth(address), OutputType::Hidden, 77, &mut rng)
            .unwrap();
        let blind = prepared.output.blind().unwrap();
        assert_eq!(blind.commitment, Commitment::new(77, &prepared.blinding));
        assert!(OpeningProver.verify(&blind.commitment, &blind.range_proof));

        let wrong = converter.prepare_output(
            &Destination::Stealth(address),
            OutputType::Transparent,
            77,
            &mut rng,
        );
        assert!(matches!(
            wrong,
            Err(WalletError::InvalidDestinationForType { .. })
        ));
    }

    #[test]
    fn excess_matches_commitment_sum() {
        let mut rng = rand::thread_rng();
        let r_in = Scalar::random(&mut rng);
        let r_out = Scalar::random(&mut rng);
        let excess = kernel_excess(&[r_in, Scalar::ZERO], &[r_out]);
        let inputs = [
            Commitment::new(60, &r_in).point().unwrap(),
            Commitment::transparent(40).point().unwrap(),
        ];
        let outputs = [Commitment::new(95, &r_out).point().unwrap()];
        assert_eq!(
            commitment_excess(&inputs, &outputs, 5).compress(),
            RistrettoPoint::mul_base(&excess).compress()
        );
    }
}
