use std::collections::HashSet;

use crate::config::ChainParams;
use crate::types::{OutPoint, OutputType};
use crate::wallet::coin_set::OwnedCoin;

/// Which owned coins may fund a payment or a stake attempt.
pub struct SelectionEligibility {
    frozen: HashSet<OutPoint>,
    min_confirmations: u32,
}

impl Default for SelectionEligibility {
    fn default() -> Self {
        Self {
            frozen: Default::default(),
            min_confirmations: 1,
        }
    }
}

impl SelectionEligibility {
    pub fn is_frozen(&self, outpoint: &OutPoint) -> bool {
        self.frozen.contains(outpoint)
    }

    /// Keeps a coin out of automatic selection and staking.
    pub fn freeze(&mut self, outpoint: OutPoint) {
        self.frozen.insert(outpoint);
    }

    pub fn unfreeze(&mut self, outpoint: &OutPoint) {
        self.frozen.remove(outpoint);
    }

    pub fn set_min_confirmations(&mut self, confirmations: u32) {
        self.min_confirmations = confirmations;
    }

    pub fn is_spendable(&self, coin: &OwnedCoin, tip_height: u32) -> bool {
        coin.is_unspent()
            && !self.is_frozen(&coin.outpoint)
            && coin.depth(tip_height) >= self.min_confirmations
    }

    /// Only mature transparent coins stake.
    pub fn is_stakeable(&self, coin: &OwnedCoin, tip_height: u32, params: &ChainParams) -> bool {
        coin.output_type == OutputType::Transparent
            && coin.is_unspent()
            && !self.is_frozen(&coin.outpoint)
            && coin.depth(tip_height) >= params.min_stake_depth
    }

    pub fn total_frozen(&self) -> usize {
        self.frozen.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ChainParams;
    use crate::crypto::commitment::{BlindingFactor, Commitment};
    use crate::crypto::keys::KeyOrigin;
    use crate::crypto::SecretKey;
    use crate::tx::Confirmation;
    use crate::types::{Hash256, OutPoint, OutputType};
    use crate::wallet::coin_set::{CoinStatus, OwnedCoin};
    use crate::wallet::selection_eligibility::SelectionEligibility;

    fn coin(output_type: OutputType, height: Option<u32>) -> OwnedCoin {
        OwnedCoin {
            outpoint: OutPoint::new(Hash256([1u8; 32]), 0),
            output_type,
            value: 10,
            blinding: BlindingFactor::ZERO,
            commitment: Commitment::transparent(10),
            owner_key: SecretKey::random(&mut rand::thread_rng()).public_key(),
            origin: KeyOrigin::Transparent { index: 0 },
            key_image: None,
            confirmation: height.map(|height| Confirmation {
                height,
                block_hash: Hash256::ZERO,
            }),
            status: CoinStatus::Unspent,
        }
    }

    #[test]
    fn unconfirmed_coins_wait() {
        let criteria = SelectionEligibility::default();
        assert!(!criteria.is_spendable(&coin(OutputType::Transparent, None), 5));
        assert!(criteria.is_spendable(&coin(OutputType::Transparent, Some(5)), 5));
    }

    #[test]
    fn frozen_coins_are_skipped() {
        let mut criteria = SelectionEligibility::default();
        let c = coin(OutputType::Hidden, Some(1));
        assert!(criteria.is_spendable(&c, 2));
        criteria.freeze(c.outpoint);
        assert!(!criteria.is_spendable(&c, 2));
        assert_eq!(criteria.total_frozen(), 1);
        criteria.unfreeze(&c.outpoint);
        assert!(criteria.is_spendable(&c, 2));
    }

    #[test]
    fn only_mature_transparent_coins_stake() {
        let criteria = SelectionEligibility::default();
        let mut params = ChainParams::REGTEST;
        params.min_stake_depth = 3;
        assert!(!criteria.is_stakeable(&coin(OutputType::Transparent, Some(9)), 10, &params));
        assert!(criteria.is_stakeable(&coin(OutputType::Transparent, Some(8)), 10, &params));
        assert!(!criteria.is_stakeable(&coin(OutputType::Hidden, Some(1)), 10, &params));

        let mut spent = coin(OutputType::Transparent, Some(1));
        spent.status = CoinStatus::PendingSpend(Hash256([2u8; 32]));
        assert!(!criteria.is_stakeable(&spent, 10, &params));
    }
}
