use serde::Serialize;

use crate::types::{Amount, OutputType};
use crate::wallet::coin_set::{CoinStatus, OwnedCoin};
use crate::wallet::selection_eligibility::SelectionEligibility;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TypeBalance {
    /// spendable now
    pub confirmed: Amount,
    /// owned but not yet deep enough to spend
    pub unconfirmed: Amount,
    /// held by built or relayed transactions that have not confirmed
    pub pending_spend: Amount,
    /// unspent but kept out of selection and staking
    pub frozen: Amount,
}

impl TypeBalance {
    pub fn total(&self) -> Amount {
        self.confirmed + self.unconfirmed + self.frozen
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub transparent: TypeBalance,
    pub hidden: TypeBalance,
    pub anonymous: TypeBalance,
}

impl Balances {
    pub fn get(&self, output_type: OutputType) -> &TypeBalance {
        match output_type {
            OutputType::Transparent => &self.transparent,
            OutputType::Hidden => &self.hidden,
            OutputType::Anonymous => &self.anonymous,
        }
    }

    fn get_mut(&mut self, output_type: OutputType) -> &mut TypeBalance {
        match output_type {
            OutputType::Transparent => &mut self.transparent,
            OutputType::Hidden => &mut self.hidden,
            OutputType::Anonymous => &mut self.anonymous,
        }
    }

    pub fn spendable(&self) -> Amount {
        OutputType::ALL.iter().map(|t| self.get(*t).confirmed).sum()
    }
}

pub struct BalanceAccumulator<'a> {
    balances: Balances,
    criteria: &'a SelectionEligibility,
    tip_height: u32,
}

impl<'a> BalanceAccumulator<'a> {
    pub fn new(criteria: &'a SelectionEligibility, tip_height: u32) -> Self {
        Self {
            balances: Default::default(),
            criteria,
            tip_height,
        }
    }

    pub fn add_coin(&mut self, coin: &OwnedCoin) {
        let frozen = self.criteria.is_frozen(&coin.outpoint);
        let spendable = self.criteria.is_spendable(coin, self.tip_height);
        let entry = self.balances.get_mut(coin.output_type);
        match coin.status {
            CoinStatus::Spent(_) => {}
            CoinStatus::PendingSpend(_) => entry.pending_spend += coin.value,
            CoinStatus::Unspent if frozen => entry.frozen += coin.value,
            CoinStatus::Unspent if spendable => entry.confirmed += coin.value,
            CoinStatus::Unspent => entry.unconfirmed += coin.value,
        }
    }

    pub fn add_coins<'c>(&mut self, coins: impl Iterator<Item = &'c OwnedCoin>) {
        coins.for_each(|coin| self.add_coin(coin));
    }

    pub fn into_balances(self) -> Balances {
        self.balances
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::commitment::{BlindingFactor, Commitment};
    use crate::crypto::keys::KeyOrigin;
    use crate::crypto::SecretKey;
    use crate::tx::Confirmation;
    use crate::types::{Hash256, OutPoint, OutputType};
    use crate::wallet::balance_accumulator::BalanceAccumulator;
    use crate::wallet::coin_set::{CoinStatus, OwnedCoin};
    use crate::wallet::selection_eligibility::SelectionEligibility;

    fn coin(index: u32, output_type: OutputType, value: u64, height: Option<u32>) -> OwnedCoin {
        OwnedCoin {
            outpoint: OutPoint::new(Hash256([1u8; 32]), index),
            output_type,
            value,
            blinding: BlindingFactor::ZERO,
            commitment: Commitment::transparent(value),
            owner_key: SecretKey::random(&mut rand::thread_rng()).public_key(),
            origin: KeyOrigin::Transparent { index },
            key_image: None,
            confirmation: height.map(|height| Confirmation {
                height,
                block_hash: Hash256::ZERO,
            }),
            status: CoinStatus::Unspent,
        }
    }

    #[test]
    fn frozen_coins_are_reported_apart() {
        let mut criteria = SelectionEligibility::default();
        let confirmed = coin(0, OutputType::Hidden, 40, Some(1));
        let fresh = coin(1, OutputType::Hidden, 5, None);
        criteria.freeze(confirmed.outpoint);
        criteria.freeze(fresh.outpoint);

        let mut accumulator = BalanceAccumulator::new(&criteria, 3);
        accumulator.add_coins([confirmed, fresh].iter());
        let balances = accumulator.into_balances();
        let hidden = balances.get(OutputType::Hidden);
        assert_eq!(hidden.frozen, 45);
        assert_eq!(hidden.confirmed, 0);
        assert_eq!(hidden.unconfirmed, 0);
        assert_eq!(hidden.total(), 45);
        assert_eq!(balances.spendable(), 0);
    }

    #[test]
    fn balances_split_by_type_and_status() {
        let criteria = SelectionEligibility::default();
        let mut pending = coin(2, OutputType::Hidden, 30, Some(1));
        pending.status = CoinStatus::PendingSpend(Hash256([7u8; 32]));
        let mut spent = coin(3, OutputType::Transparent, 1_000, Some(1));
        spent.status = CoinStatus::Spent(Hash256([8u8; 32]));
        let coins = vec![
            coin(0, OutputType::Transparent, 100, Some(1)),
            coin(1, OutputType::Transparent, 50, None),
            pending,
            spent,
            coin(4, OutputType::Anonymous, 7, Some(2)),
        ];

        let mut accumulator = BalanceAccumulator::new(&criteria, 2);
        accumulator.add_coins(coins.iter());
        let balances = accumulator.into_balances();

        assert_eq!(balances.get(OutputType::Transparent).confirmed, 100);
        assert_eq!(balances.get(OutputType::Transparent).unconfirmed, 50);
        assert_eq!(balances.get(OutputType::Transparent).total(), 150);
        assert_eq!(balances.get(OutputType::Hidden).pending_spend, 30);
        assert_eq!(balances.get(OutputType::Hidden).total(), 0);
        assert_eq!(balances.get(OutputType::Anonymous).confirmed, 7);
        assert_eq!(balances.spendable(), 107);
    }
}
