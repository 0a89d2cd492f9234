//! Coin selection with an iterative fee fixed point.
//!
//! The fee depends on how many inputs and outputs of each privacy type the
//! transaction ends up with, and the input count depends on the fee. The
//! selector alternates between the two until the estimate stops moving,
//! giving up with `FeeEstimationDivergence` after a configured bound.

use tracing::debug;

use crate::config::FeeConfig;
use crate::error::WalletError;
use crate::types::{Amount, OutputType};
use crate::wallet::coin_set::OwnedCoin;

/// Counts of inputs and outputs per privacy type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxShape {
    pub inputs: [usize; 3],
    pub outputs: [usize; 3],
    /// members per anonymous input ring
    pub ring_size: usize,
}

impl TxShape {
    pub fn add_input(&mut self, output_type: OutputType) {
        self.inputs[output_type.slot()] += 1;
    }

    pub fn add_output(&mut self, output_type: OutputType) {
        self.outputs[output_type.slot()] += 1;
    }

    pub fn has_committed_parts(&self) -> bool {
        self.inputs[1] + self.inputs[2] + self.outputs[1] + self.outputs[2] > 0
    }
}

pub trait FeeEstimator {
    fn estimate_fee(&self, shape: &TxShape) -> Amount;
}

/// Fee from the serialized size the shape would have.
pub struct SizeFeeEstimator {
    config: FeeConfig,
}

impl SizeFeeEstimator {
    const BASE_SIZE: usize = 16;
    const KERNEL_SIZE: usize = 96;
    const KEY_INPUT_SIZE: usize = 100;
    const RING_INPUT_BASE_SIZE: usize = 96;
    const RING_MEMBER_SIZE: usize = 72;
    const PLAIN_OUTPUT_SIZE: usize = 40;
    const COMMITTED_OUTPUT_SIZE: usize = 104;

    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }

    pub fn estimate_size(&self, shape: &TxShape) -> usize {
        let mut size = Self::BASE_SIZE;
        size += (shape.inputs[0] + shape.inputs[1]) * Self::KEY_INPUT_SIZE;
        size += shape.inputs[2]
            * (Self::RING_INPUT_BASE_SIZE + shape.ring_size.max(1) * Self::RING_MEMBER_SIZE);
        size += shape.outputs[0] * Self::PLAIN_OUTPUT_SIZE;
        size += (shape.outputs[1] + shape.outputs[2])
            * (Self::COMMITTED_OUTPUT_SIZE + self.config.range_proof_size);
        if shape.has_committed_parts() {
            size += Self::KERNEL_SIZE;
        }
        size
    }
}

impl FeeEstimator for SizeFeeEstimator {
    fn estimate_fee(&self, shape: &TxShape) -> Amount {
        let size = self.estimate_size(shape) as u128;
        let fee = (size * self.config.rate_per_kb as u128 + 999) / 1000;
        (fee.min(Amount::MAX as u128) as Amount).max(self.config.min_fee)
    }
}

pub struct SelectionRequest<'a> {
    /// recipient amounts in descriptor order with their output types
    pub recipients: &'a [(OutputType, Amount)],
    pub change_type: OutputType,
    pub subtract_fee_from_recipient: bool,
    pub ring_size: usize,
}

#[derive(Clone, Debug)]
pub struct Selection {
    pub inputs: Vec<OwnedCoin>,
    /// amounts after any fee subtraction, same order as the request
    pub recipient_amounts: Vec<Amount>,
    pub change: Option<Amount>,
    pub fee: Amount,
    pub iterations: usize,
}

impl Selection {
    pub fn input_value(&self) -> Amount {
        self.inputs.iter().map(|c| c.value).sum()
    }
}

fn shape_for(
    inputs: &[OwnedCoin],
    extra_input: Option<OutputType>,
    request: &SelectionRequest<'_>,
    with_change: bool,
) -> TxShape {
    let mut shape = TxShape {
        ring_size: request.ring_size,
        ..Default::default()
    };
    inputs.iter().for_each(|c| shape.add_input(c.output_type));
    if let Some(output_type) = extra_input {
        shape.add_input(output_type);
    }
    request
        .recipients
        .iter()
        .for_each(|(output_type, _)| shape.add_output(*output_type));
    if with_change {
        shape.add_output(request.change_type);
    }
    shape
}

/// Splits `fee` over the recipients, remainder on the first one.
fn subtract_fee(recipients: &[(OutputType, Amount)], fee: Amount) -> Result<Vec<Amount>, WalletError> {
    let count = recipients.len().max(1) as Amount;
    let share = fee / count;
    let remainder = fee % count;
    recipients
        .iter()
        .enumerate()
        .map(|(index, (_, amount))| {
            let due = if index == 0 { share + remainder } else { share };
            match amount.checked_sub(due) {
                Some(left) if left > 0 => Ok(left),
                _ => Err(WalletError::InsufficientFunds(format!(
                    "recipient {} amount {} does not cover its fee share {}",
                    index, amount, due
                ))),
            }
        })
        .collect()
}

/// Picks coins from `candidates` in order until they cover the recipients
/// and the fee estimated for the resulting transaction.
pub fn select_coins(
    candidates: &[OwnedCoin],
    request: &SelectionRequest<'_>,
    estimator: &dyn FeeEstimator,
    config: &FeeConfig,
) -> Result<Selection, WalletError> {
    let target = request
        .recipients
        .iter()
        .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
        .ok_or_else(|| WalletError::InvalidRequest("recipient amounts overflow".to_string()))?;

    let first_type = candidates.first().map(|c| c.output_type);
    let mut fee = estimator.estimate_fee(&shape_for(&[], first_type, request, true));
    let mut with_change = true;
    let mut selected: Vec<OwnedCoin> = vec![];
    let mut total: Amount = 0;
    let mut remaining = candidates.iter();

    'rounds: for iteration in 1..=config.max_iterations {
        let needed = if request.subtract_fee_from_recipient {
            target
        } else {
            target.saturating_add(fee)
        };
        while total < needed || selected.is_empty() {
            match remaining.next() {
                Some(coin) => {
                    total += coin.value;
                    selected.push(coin.clone());
                }
                None if with_change && !selected.is_empty() => {
                    // out of coins, retry without a change output
                    with_change = false;
                    fee = estimator.estimate_fee(&shape_for(&selected, None, request, false));
                    continue 'rounds;
                }
                None => {
                    return Err(WalletError::InsufficientFunds(format!(
                        "need {}, spendable {}",
                        needed, total
                    )))
                }
            }
        }

        let estimate = estimator.estimate_fee(&shape_for(&selected, None, request, with_change));
        debug!(
            "selection round {}: {} inputs, total {}, fee {} -> {}",
            iteration,
            selected.len(),
            total,
            fee,
            estimate
        );
        if estimate > fee || fee - estimate > config.tolerance {
            fee = estimate;
            continue;
        }

        let recipient_amounts = if request.subtract_fee_from_recipient {
            subtract_fee(request.recipients, fee)?
        } else {
            request.recipients.iter().map(|(_, amount)| *amount).collect()
        };
        let paid: Amount = recipient_amounts.iter().sum();
        let change = total - paid - fee;

        if with_change && change <= config.dust_threshold {
            // dust goes to the fee, dropping the change output only shrinks the transaction
            with_change = false;
            debug!("change {} at or below dust, added to fee", change);
        }
        let (change, fee) = if with_change {
            (Some(change), fee)
        } else {
            (None, fee + change)
        };
        return Ok(Selection {
            inputs: selected,
            recipient_amounts,
            change,
            fee,
            iterations: iteration,
        });
    }
    Err(WalletError::FeeEstimationDivergence {
        iterations: config.max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use crate::config::FeeConfig;
    use crate::crypto::commitment::{BlindingFactor, Commitment};
    use crate::crypto::keys::KeyOrigin;
    use crate::crypto::SecretKey;
    use crate::error::WalletError;
    use crate::types::{Amount, Hash256, OutPoint, OutputType, COIN};
    use crate::wallet::coin_set::{CoinStatus, OwnedCoin};
    use crate::wallet::selection::{
        select_coins, FeeEstimator, SelectionRequest, SizeFeeEstimator, TxShape,
    };

    fn coins(values: &[Amount]) -> Vec<OwnedCoin> {
        let key = SecretKey::random(&mut rand::thread_rng()).public_key();
        values
            .iter()
            .enumerate()
            .map(|(index, value)| OwnedCoin {
                outpoint: OutPoint::new(Hash256([1u8; 32]), index as u32),
                output_type: OutputType::Transparent,
                value: *value,
                blinding: BlindingFactor::ZERO,
                commitment: Commitment::transparent(*value),
                owner_key: key,
                origin: KeyOrigin::Transparent {
                    index: index as u32,
                },
                key_image: None,
                confirmation: None,
                status: CoinStatus::Unspent,
            })
            .collect()
    }

    fn request(recipients: &[(OutputType, Amount)]) -> SelectionRequest<'_> {
        SelectionRequest {
            recipients,
            change_type: OutputType::Transparent,
            subtract_fee_from_recipient: false,
            ring_size: 5,
        }
    }

    #[test]
    fn committed_outputs_cost_more() {
        let estimator = SizeFeeEstimator::new(FeeConfig::default());
        let mut plain = TxShape::default();
        plain.add_input(OutputType::Transparent);
        plain.add_output(OutputType::Transparent);
        let mut hidden = plain.clone();
        hidden.add_output(OutputType::Hidden);
        assert!(estimator.estimate_size(&hidden) > estimator.estimate_size(&plain) + 675);

        let mut ring = TxShape {
            ring_size: 11,
            ..Default::default()
        };
        ring.add_input(OutputType::Anonymous);
        let mut small_ring = ring.clone();
        small_ring.ring_size = 3;
        assert!(estimator.estimate_fee(&ring) > estimator.estimate_fee(&small_ring));
    }

    #[test]
    fn selection_covers_amount_plus_fee() {
        let config = FeeConfig::default();
        let estimator = SizeFeeEstimator::new(config.clone());
        let candidates = coins(&[COIN; 5]);
        for amount in [1_000, COIN / 2, COIN, 3 * COIN, 4 * COIN + COIN / 2] {
            let recipients = [(OutputType::Hidden, amount)];
            let selection =
                select_coins(&candidates, &request(&recipients), &estimator, &config).unwrap();
            assert!(selection.input_value() >= amount + selection.fee);
            assert_eq!(
                selection.input_value(),
                amount + selection.fee + selection.change.unwrap_or(0)
            );
            if let Some(change) = selection.change {
                assert!(change > config.dust_threshold);
            }
        }
    }

    #[test]
    fn insufficient_funds() {
        let config = FeeConfig::default();
        let estimator = SizeFeeEstimator::new(config.clone());
        let recipients = [(OutputType::Transparent, 5 * COIN)];
        let result = select_coins(&coins(&[COIN; 5]), &request(&recipients), &estimator, &config);
        assert!(matches!(result, Err(WalletError::InsufficientFunds(_))));
    }

    #[test]
    fn dust_change_is_absorbed_into_fee() {
        let config = FeeConfig::default();
        let estimator = SizeFeeEstimator::new(config.clone());
        let mut shape = TxShape::default();
        shape.add_input(OutputType::Transparent);
        shape.add_output(OutputType::Transparent);
        let exact_fee = estimator.estimate_fee(&shape);

        let candidates = coins(&[10_000 + exact_fee + 100]);
        let recipients = [(OutputType::Transparent, 10_000)];
        let selection =
            select_coins(&candidates, &request(&recipients), &estimator, &config).unwrap();
        assert_eq!(selection.change, None);
        assert_eq!(selection.fee, exact_fee + 100);
    }

    #[test]
    fn subtract_fee_splits_between_recipients() {
        let config = FeeConfig::default();
        let estimator = SizeFeeEstimator::new(config.clone());
        let candidates = coins(&[COIN]);
        let recipients = [
            (OutputType::Transparent, COIN / 2),
            (OutputType::Transparent, COIN / 2),
        ];
        let mut req = request(&recipients);
        req.subtract_fee_from_recipient = true;
        let selection = select_coins(&candidates, &req, &estimator, &config).unwrap();
        assert_eq!(selection.change, None);
        let paid: u64 = selection.recipient_amounts.iter().sum();
        assert_eq!(paid + selection.fee, COIN);
        assert!(selection.recipient_amounts[0] <= selection.recipient_amounts[1]);
    }

    struct Oscillating {
        calls: Cell<u64>,
    }

    impl FeeEstimator for Oscillating {
        fn estimate_fee(&self, _shape: &TxShape) -> Amount {
            let calls = self.calls.get() + 1;
            self.calls.set(calls);
            1_000 + calls * 10
        }
    }

    #[test]
    fn diverging_fee_gives_up() {
        let config = FeeConfig {
            max_iterations: 4,
            ..Default::default()
        };
        let estimator = Oscillating {
            calls: Cell::new(0),
        };
        let recipients = [(OutputType::Transparent, 1_000)];
        let result = select_coins(&coins(&[COIN; 3]), &request(&recipients), &estimator, &config);
        assert!(matches!(
            result,
            Err(WalletError::FeeEstimationDivergence { iterations: 4 })
        ));
    }
}
