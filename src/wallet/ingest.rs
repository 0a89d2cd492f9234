//! Recognising wallet-owned outputs and spends in arbitrary transactions.
//!
//! Trial decryption of committed outputs is the expensive step. It runs
//! before the wallet lock is taken; only the resulting bookkeeping is
//! applied under it.

use std::sync::Arc;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use tracing::debug;

use crate::crypto::commitment::BlindingFactor;
use crate::crypto::keys::{KeyOrigin, KeyStore};
use crate::crypto::signature::KeyImage;
use crate::crypto::stealth::open_output;
use crate::tx::{
    BlindOutput, Confirmation, InputRecord, OutputRecord, Transaction, TransactionRecord, TxInput,
    TxOutput,
};
use crate::types::{Amount, OutPoint, OutputType, TxId};
use crate::wallet::coin_set::{CoinStatus, OwnedCoin};
use crate::wallet::{WalletContext, WalletState};

/// What the wallet learns about a committed output it can open.
#[derive(Clone, Debug)]
pub struct OwnedOutputInfo {
    pub value: Amount,
    pub blinding: Scalar,
    pub origin: KeyOrigin,
    /// anonymous outputs only
    pub key_image: Option<KeyImage>,
}

/// Ownership check for committed outputs.
pub trait OutputScanner: Send + Sync {
    /// `None` when the output is not ours or cannot be checked right now.
    fn try_open(&self, output: &BlindOutput, output_type: OutputType) -> Option<OwnedOutputInfo>;
}

/// Opens outputs sent to the key store's stealth address.
pub struct StealthScanner {
    keys: Arc<dyn KeyStore>,
    spend_public: Option<RistrettoPoint>,
}

impl StealthScanner {
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        let spend_public = keys.stealth_address().spend.point();
        Self { keys, spend_public }
    }
}

impl OutputScanner for StealthScanner {
    fn try_open(&self, output: &BlindOutput, output_type: OutputType) -> Option<OwnedOutputInfo> {
        let spend_public = self.spend_public.as_ref()?;
        let scan = match self.keys.derive_stealth_scan_key() {
            Some(scan) => scan,
            None => {
                debug!("scan key unavailable, skipping ownership check");
                return None;
            }
        };
        let opened = open_output(
            scan.scalar(),
            spend_public,
            &output.one_time_key,
            &output.commitment,
            &output.stealth,
        )?;
        let origin = KeyOrigin::stealth(&opened.tweak);
        let key_image = match output_type {
            OutputType::Anonymous => Some(KeyImage::derive(&self.keys.derive_spend_key(&origin)?)),
            _ => None,
        };
        Some(OwnedOutputInfo {
            value: opened.value,
            blinding: opened.blinding,
            origin,
            key_image,
        })
    }
}

impl WalletContext {
    /// Records `tx` if it pays to or spends from this wallet and returns
    /// whether it does. Ingesting the same transaction again only updates
    /// its confirmation.
    pub fn add_to_wallet_if_involving_me(
        &self,
        tx: &Transaction,
        confirmation: Option<Confirmation>,
    ) -> bool {
        let txid = tx.txid();
        let opened: Vec<Option<OwnedOutputInfo>> = tx
            .outputs
            .iter()
            .map(|output| {
                output
                    .blind()
                    .and_then(|blind| self.scanner.try_open(blind, output.output_type()))
            })
            .collect();

        let mut state = self.lock();
        let involved = state.ingest(self.keys.as_ref(), tx, txid, opened, confirmation);
        if involved {
            debug!(
                "{}: ingested {} (confirmed: {})",
                self.name,
                txid,
                confirmation.is_some()
            );
        }
        involved
    }
}

impl WalletState {
    pub(crate) fn ingest(
        &mut self,
        keys: &dyn KeyStore,
        tx: &Transaction,
        txid: TxId,
        opened: Vec<Option<OwnedOutputInfo>>,
        confirmation: Option<Confirmation>,
    ) -> bool {
        let confirmed = confirmation.is_some();
        let known = self.records.contains_key(&txid);

        let mut inputs = vec![];
        for input in tx.inputs.iter() {
            let spent = match input {
                TxInput::Transparent { prevout } | TxInput::Hidden { prevout } => self
                    .coins
                    .mark_spent(prevout, txid, confirmed)
                    .then_some(*prevout),
                TxInput::Anonymous { key_image, .. } => {
                    self.coins.mark_spent_by_image(key_image, txid, confirmed)
                }
            };
            if known {
                continue;
            }
            if let Some(coin) = spent.and_then(|outpoint| self.coins.get(&outpoint)) {
                let ring = match input {
                    TxInput::Anonymous { ring, .. } => ring.clone(),
                    _ => vec![],
                };
                inputs.push(InputRecord {
                    output_type: coin.output_type,
                    prevout: Some(coin.outpoint),
                    value: coin.value,
                    real_index: None,
                    ring,
                    blinding: Some(coin.blinding),
                });
            }
        }
        let from_me = !inputs.is_empty();

        let mut outputs = vec![];
        let mut owns_output = false;
        for (index, (output, opened)) in tx.outputs.iter().zip(opened).enumerate() {
            let index = index as u32;
            let owned = match output {
                TxOutput::Transparent(plain) => {
                    self.addresses
                        .index_of(&plain.address)
                        .map(|key_index| OwnedOutputInfo {
                            value: plain.value,
                            blinding: Scalar::ZERO,
                            origin: KeyOrigin::Transparent { index: key_index },
                            key_image: None,
                        })
                }
                TxOutput::Hidden(_) | TxOutput::Anonymous(_) => opened,
            };

            let info = match owned {
                Some(info) => info,
                None => {
                    if from_me {
                        outputs.push(OutputRecord {
                            index,
                            output_type: output.output_type(),
                            value: output.plain_value().unwrap_or_default(),
                            blinding: None,
                            owned: false,
                            change: false,
                        });
                    }
                    continue;
                }
            };
            owns_output = true;

            let change = match (output, info.origin) {
                (TxOutput::Transparent(plain), KeyOrigin::Transparent { index: key_index }) => {
                    self.addresses.mark_used(key_index, keys);
                    from_me && self.addresses.is_change(&plain.address)
                }
                _ => false,
            };
            let blinding = BlindingFactor::from_scalar(&info.blinding);
            self.coins.insert(OwnedCoin {
                outpoint: OutPoint::new(txid, index),
                output_type: output.output_type(),
                value: info.value,
                blinding,
                commitment: output.commitment(),
                owner_key: *output.owner_key(),
                origin: info.origin,
                key_image: info.key_image,
                confirmation,
                status: CoinStatus::Unspent,
            });
            if !known {
                outputs.push(OutputRecord {
                    index,
                    output_type: output.output_type(),
                    value: info.value,
                    blinding: output.output_type().is_committed().then_some(blinding),
                    owned: true,
                    change,
                });
            }
        }

        match self.records.get_mut(&txid) {
            Some(record) => {
                if confirmation.is_some() {
                    record.confirmation = confirmation;
                }
                true
            }
            None if from_me || owns_output => {
                self.records.insert(
                    txid,
                    TransactionRecord {
                        txid,
                        inputs,
                        outputs,
                        fee: tx.fee,
                        from_me,
                        confirmation,
                    },
                );
                true
            }
            None => false,
        }
    }
}
