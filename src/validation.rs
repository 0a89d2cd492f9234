//! Transaction checks shared by the ledger and by tests.

use curve25519_dalek::ristretto::RistrettoPoint;
use itertools::Itertools;

use crate::chain::{AnonSet, OutputLookup};
use crate::crypto::commitment::verify_commitment_sum;
use crate::crypto::range_proof::RangeProver;
use crate::crypto::signature::{verify, verify_ring, KeyImage, RingMember};
use crate::crypto::PublicKey;
use crate::error::RelayError;
use crate::tx::{InputWitness, Transaction, TxInput, TxKind, TxOutput};
use crate::types::Amount;

/// Chain state a transaction is checked against.
pub trait ValidationView: OutputLookup + AnonSet {
    fn key_image_spent(&self, image: &KeyImage) -> bool;
}

struct ResolvedInput {
    commitment: RistrettoPoint,
    plain_value: Option<Amount>,
}

/// Full context-dependent check of a non-coinbase transaction. Coinstake
/// value rules are left to the stake check.
pub fn check_transaction(
    tx: &Transaction,
    view: &dyn ValidationView,
    prover: &dyn RangeProver,
) -> Result<(), RelayError> {
    check_structure(tx)?;
    let message = tx.txid();
    let message = message.as_bytes();

    for (index, output) in tx.outputs.iter().enumerate() {
        if let Some(blind) = output.blind() {
            if !prover.verify(&blind.commitment, &blind.range_proof) {
                return Err(RelayError::InvalidRangeProof { index });
            }
        }
    }

    let mut resolved = Vec::with_capacity(tx.inputs.len());
    for (index, (input, witness)) in tx.inputs.iter().zip(tx.witness.iter()).enumerate() {
        resolved.push(check_input(index, input, witness, message, view)?);
    }

    if tx.kind == TxKind::Coinstake {
        return Ok(());
    }
    verify_balance(tx, &resolved)
}

fn check_structure(tx: &Transaction) -> Result<(), RelayError> {
    if tx.kind == TxKind::Coinbase {
        return Err(RelayError::Malformed("coinbase outside genesis".to_string()));
    }
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(RelayError::Malformed("empty inputs or outputs".to_string()));
    }
    if tx.witness.len() != tx.inputs.len() {
        return Err(RelayError::Malformed(format!(
            "{} witnesses for {} inputs",
            tx.witness.len(),
            tx.inputs.len()
        )));
    }
    if tx.kind == TxKind::Coinstake
        && (tx.inputs.len() != 1 || tx.inputs[0].output_type().is_committed())
    {
        return Err(RelayError::Malformed(
            "coinstake must spend exactly one transparent coin".to_string(),
        ));
    }

    let prevouts: Vec<_> = tx.inputs.iter().filter_map(|i| i.prevout()).collect();
    if !prevouts.iter().all_unique() {
        let duplicate = prevouts
            .iter()
            .find(|p| prevouts.iter().filter(|q| q == p).count() > 1);
        if let Some(prevout) = duplicate {
            return Err(RelayError::DuplicateInput(**prevout));
        }
    }
    let mut images = tx.inputs.iter().filter_map(|i| match i {
        TxInput::Anonymous { key_image, .. } => Some(key_image),
        _ => None,
    });
    if !images.all_unique() {
        return Err(RelayError::Malformed("key image used twice".to_string()));
    }
    Ok(())
}

fn check_input(
    index: usize,
    input: &TxInput,
    witness: &InputWitness,
    message: &[u8; 32],
    view: &dyn ValidationView,
) -> Result<ResolvedInput, RelayError> {
    match input {
        TxInput::Transparent { prevout } | TxInput::Hidden { prevout } => {
            let spent = view
                .lookup_output(prevout)
                .ok_or(RelayError::MissingInput(*prevout))?;
            if spent.output.output_type() != input.output_type() {
                return Err(RelayError::Malformed(format!(
                    "input {} spends a {} output as {}",
                    index,
                    spent.output.output_type(),
                    input.output_type()
                )));
            }
            let commitment = spent
                .output
                .commitment()
                .point()
                .ok_or_else(|| RelayError::Malformed("bad spent commitment".to_string()))?;
            let signature = match witness {
                InputWitness::Key(signature) => signature,
                InputWitness::Ring(_) => return Err(RelayError::InvalidSignature { index }),
            };
            if !verify(spent.output.owner_key(), message, signature) {
                return Err(RelayError::InvalidSignature { index });
            }
            Ok(ResolvedInput {
                commitment,
                plain_value: spent.output.plain_value(),
            })
        }
        TxInput::Anonymous {
            ring,
            key_image,
            pseudo_commitment,
        } => {
            if ring.is_empty() || !ring.iter().all_unique() {
                return Err(RelayError::Malformed(format!(
                    "input {} has an empty or repeating ring",
                    index
                )));
            }
            if view.key_image_spent(key_image) {
                return Err(RelayError::KeyImageSpent(key_image.to_string()));
            }
            let pseudo = pseudo_commitment
                .point()
                .ok_or_else(|| RelayError::Malformed("bad pseudo commitment".to_string()))?;
            let members = ring
                .iter()
                .map(|member_index| {
                    let member = view
                        .anon_member(*member_index)
                        .ok_or(RelayError::UnknownRingMember(*member_index))?;
                    match (member.one_time_key.point(), member.commitment.point()) {
                        (Some(key), Some(commitment)) => Ok(RingMember {
                            key,
                            commitment_delta: commitment - pseudo,
                        }),
                        _ => Err(RelayError::UnknownRingMember(*member_index)),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            let signature = match witness {
                InputWitness::Ring(signature) => signature,
                InputWitness::Key(_) => return Err(RelayError::InvalidSignature { index }),
            };
            if !verify_ring(message, &members, key_image, signature) {
                return Err(RelayError::InvalidSignature { index });
            }
            Ok(ResolvedInput {
                commitment: pseudo,
                plain_value: None,
            })
        }
    }
}

fn verify_balance(tx: &Transaction, inputs: &[ResolvedInput]) -> Result<(), RelayError> {
    if !tx.has_committed_parts() {
        if tx.kernel.is_some() {
            return Err(RelayError::InvalidKernel);
        }
        let input_value = inputs
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.plain_value?));
        let output_value = tx
            .outputs
            .iter()
            .try_fold(tx.fee, |acc, o| acc.checked_add(o.plain_value()?));
        return match (input_value, output_value) {
            (Some(a), Some(b)) if a == b => Ok(()),
            _ => Err(RelayError::Unbalanced),
        };
    }

    let kernel = tx.kernel.as_ref().ok_or(RelayError::InvalidKernel)?;
    let excess = kernel.excess.point().ok_or(RelayError::InvalidKernel)?;
    let input_points: Vec<RistrettoPoint> = inputs.iter().map(|i| i.commitment).collect();
    let output_points = tx
        .outputs
        .iter()
        .map(|o| o.commitment().point())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| RelayError::Malformed("bad output commitment".to_string()))?;

    if !verify_commitment_sum(&input_points, &output_points, tx.fee, &excess) {
        return Err(RelayError::Unbalanced);
    }
    if !verify(&kernel.excess, tx.txid().as_bytes(), &kernel.signature) {
        return Err(RelayError::InvalidKernel);
    }
    Ok(())
}

/// Owner keys of the plain outputs, for address-match ingestion.
pub fn transparent_recipients(tx: &Transaction) -> impl Iterator<Item = (u32, &PublicKey)> {
    tx.outputs
        .iter()
        .enumerate()
        .filter_map(|(index, output)| match output {
            TxOutput::Transparent(plain) => Some((index as u32, &plain.address)),
            _ => None,
        })
}
