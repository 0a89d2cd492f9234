use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::crypto::commitment::{BlindingFactor, Commitment};
use crate::crypto::keys::KeyOrigin;
use crate::crypto::signature::KeyImage;
use crate::crypto::PublicKey;
use crate::tx::Confirmation;
use crate::types::{Amount, OutPoint, OutputType, TxId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "txid", rename_all = "snake_case")]
pub enum CoinStatus {
    Unspent,
    /// spent by a built or relayed transaction that has not confirmed
    PendingSpend(TxId),
    Spent(TxId),
}

/// A wallet-owned output with everything needed to spend it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedCoin {
    pub outpoint: OutPoint,
    pub output_type: OutputType,
    pub value: Amount,
    pub blinding: BlindingFactor,
    pub commitment: Commitment,
    /// address for transparent coins, one-time key otherwise
    pub owner_key: PublicKey,
    pub origin: KeyOrigin,
    pub key_image: Option<KeyImage>,
    pub confirmation: Option<Confirmation>,
    pub status: CoinStatus,
}

impl OwnedCoin {
    pub fn is_unspent(&self) -> bool {
        self.status == CoinStatus::Unspent
    }

    /// Confirmations as seen from a tip at `tip_height`.
    pub fn depth(&self, tip_height: u32) -> u32 {
        match self.confirmation {
            Some(conf) if conf.height <= tip_height => tip_height - conf.height + 1,
            _ => 0,
        }
    }
}

/// Owned outputs keyed by outpoint. Anonymous coins are also indexed by
/// key image, the only handle a spending transaction reveals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoinSet {
    coins: BTreeMap<OutPoint, OwnedCoin>,
    key_images: HashMap<KeyImage, OutPoint>,
}

impl CoinSet {
    /// Adds a coin. An already known coin only picks up a confirmation.
    /// Returns whether the coin was new.
    pub fn insert(&mut self, coin: OwnedCoin) -> bool {
        if let Some(existing) = self.coins.get_mut(&coin.outpoint) {
            if coin.confirmation.is_some() {
                existing.confirmation = coin.confirmation;
            }
            if existing.key_image.is_none() {
                existing.key_image = coin.key_image;
                if let Some(image) = coin.key_image {
                    self.key_images.insert(image, coin.outpoint);
                }
            }
            return false;
        }
        if let Some(image) = coin.key_image {
            self.key_images.insert(image, coin.outpoint);
        }
        self.coins.insert(coin.outpoint, coin);
        true
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&OwnedCoin> {
        self.coins.get(outpoint)
    }

    pub fn by_key_image(&self, image: &KeyImage) -> Option<&OwnedCoin> {
        self.key_images.get(image).and_then(|o| self.coins.get(o))
    }

    pub fn iter(&self) -> impl Iterator<Item = &OwnedCoin> {
        self.coins.values()
    }

    pub fn unspent(&self) -> impl Iterator<Item = &OwnedCoin> {
        self.coins.values().filter(|c| c.is_unspent())
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn mark_pending(&mut self, outpoints: &[OutPoint], txid: TxId) {
        for outpoint in outpoints.iter() {
            if let Some(coin) = self.coins.get_mut(outpoint) {
                if coin.is_unspent() {
                    coin.status = CoinStatus::PendingSpend(txid);
                }
            }
        }
    }

    /// Records a spend seen on the network. Confirmed spends are final,
    /// unconfirmed ones leave the coin pending.
    pub fn mark_spent(&mut self, outpoint: &OutPoint, txid: TxId, confirmed: bool) -> bool {
        match self.coins.get_mut(outpoint) {
            Some(coin) => {
                coin.status = match (coin.status, confirmed) {
                    (_, true) => CoinStatus::Spent(txid),
                    (CoinStatus::Spent(by), false) => CoinStatus::Spent(by),
                    (_, false) => CoinStatus::PendingSpend(txid),
                };
                true
            }
            None => false,
        }
    }

    pub fn mark_spent_by_image(
        &mut self,
        image: &KeyImage,
        txid: TxId,
        confirmed: bool,
    ) -> Option<OutPoint> {
        let outpoint = *self.key_images.get(image)?;
        self.mark_spent(&outpoint, txid, confirmed);
        Some(outpoint)
    }

    /// Returns coins held by `txid` to unspent. Returns how many.
    pub fn release(&mut self, txid: &TxId) -> usize {
        let mut released = 0;
        for coin in self.coins.values_mut() {
            match coin.status {
                CoinStatus::PendingSpend(by) | CoinStatus::Spent(by) if by == *txid => {
                    coin.status = CoinStatus::Unspent;
                    released += 1;
                }
                _ => {}
            }
        }
        released
    }

    /// Drops coins created by `txid`.
    pub fn remove_created_by(&mut self, txid: &TxId) -> Vec<OwnedCoin> {
        let outpoints: Vec<OutPoint> = self
            .coins
            .range(OutPoint::new(*txid, 0)..=OutPoint::new(*txid, u32::MAX))
            .map(|(outpoint, _)| *outpoint)
            .collect();
        let mut removed = Vec::with_capacity(outpoints.len());
        for outpoint in outpoints.iter() {
            if let Some(coin) = self.coins.remove(outpoint) {
                if let Some(image) = coin.key_image {
                    self.key_images.remove(&image);
                }
                removed.push(coin);
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::commitment::{BlindingFactor, Commitment};
    use crate::crypto::keys::KeyOrigin;
    use crate::crypto::signature::KeyImage;
    use crate::crypto::SecretKey;
    use crate::tx::Confirmation;
    use crate::types::{Hash256, OutPoint, OutputType};
    use crate::wallet::coin_set::{CoinSet, CoinStatus, OwnedCoin};

    fn coin(txid: u8, index: u32, value: u64) -> OwnedCoin {
        OwnedCoin {
            outpoint: OutPoint::new(Hash256([txid; 32]), index),
            output_type: OutputType::Transparent,
            value,
            blinding: BlindingFactor::ZERO,
            commitment: Commitment::transparent(value),
            owner_key: SecretKey::random(&mut rand::thread_rng()).public_key(),
            origin: KeyOrigin::Transparent { index },
            key_image: None,
            confirmation: None,
            status: CoinStatus::Unspent,
        }
    }

    #[test]
    fn insert_is_idempotent_and_keeps_confirmation() {
        let mut set = CoinSet::default();
        let mut first = coin(1, 0, 100);
        assert!(set.insert(first.clone()));
        let snapshot = set.clone();
        assert!(!set.insert(first.clone()));
        assert_eq!(set, snapshot);

        first.confirmation = Some(Confirmation {
            height: 3,
            block_hash: Hash256([9u8; 32]),
        });
        assert!(!set.insert(first.clone()));
        assert_eq!(set.get(&first.outpoint).unwrap().depth(4), 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn pending_then_released() {
        let mut set = CoinSet::default();
        let a = coin(1, 0, 100);
        let b = coin(1, 1, 50);
        set.insert(a.clone());
        set.insert(b.clone());

        let spender = Hash256([5u8; 32]);
        set.mark_pending(&[a.outpoint], spender);
        assert_eq!(set.unspent().count(), 1);
        assert_eq!(
            set.get(&a.outpoint).unwrap().status,
            CoinStatus::PendingSpend(spender)
        );

        assert_eq!(set.release(&spender), 1);
        assert_eq!(set.unspent().count(), 2);
    }

    #[test]
    fn unconfirmed_spend_does_not_undo_confirmed_one() {
        let mut set = CoinSet::default();
        let a = coin(1, 0, 100);
        set.insert(a.clone());
        let spender = Hash256([5u8; 32]);
        set.mark_spent(&a.outpoint, spender, true);
        set.mark_spent(&a.outpoint, spender, false);
        assert_eq!(set.get(&a.outpoint).unwrap().status, CoinStatus::Spent(spender));
    }

    #[test]
    fn key_image_spends_and_removal() {
        let mut set = CoinSet::default();
        let mut anon = coin(2, 0, 70);
        anon.output_type = OutputType::Anonymous;
        let image = KeyImage::derive(&SecretKey::random(&mut rand::thread_rng()));
        anon.key_image = Some(image);
        set.insert(anon.clone());
        set.insert(coin(3, 0, 1));

        let spender = Hash256([6u8; 32]);
        assert_eq!(
            set.mark_spent_by_image(&image, spender, false),
            Some(anon.outpoint)
        );
        assert!(set.by_key_image(&image).is_some());

        let removed = set.remove_created_by(&anon.outpoint.txid);
        assert_eq!(removed.len(), 1);
        assert!(set.by_key_image(&image).is_none());
        assert_eq!(set.len(), 1);
    }
}
