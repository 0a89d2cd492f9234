//! The wallet engine: one `WalletContext` per wallet, owning a single state
//! mutex that every mutation of coins, records and the stake window goes
//! through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::chain::{Chain, ChainListener};
use crate::config::{ChainParams, EngineConfig};
use crate::crypto::keys::KeyStore;
use crate::crypto::range_proof::RangeProver;
use crate::crypto::stealth::StealthAddress;
use crate::crypto::PublicKey;
use crate::error::{RelayError, WalletError};
use crate::staking::window::StakeWindow;
use crate::tx::{Block, Confirmation, Transaction, TransactionRecord};
use crate::types::{BlockHash, OutPoint, OutputType, TxId};

pub mod address_book;
pub mod address_mapper;
pub mod balance_accumulator;
pub mod builder;
pub mod change_extraction;
pub mod coin_set;
pub mod conversion;
pub mod descriptor;
pub mod ingest;
pub mod selection;
pub mod selection_eligibility;

use address_book::AddressBook;
use balance_accumulator::{BalanceAccumulator, Balances};
use builder::{BuildEnv, BuildOutcome, BuildRequest};
use coin_set::{CoinSet, OwnedCoin};
use descriptor::Destination;
use ingest::{OutputScanner, StealthScanner};
use selection_eligibility::SelectionEligibility;

/// Everything guarded by the wallet lock.
pub struct WalletState {
    pub(crate) coins: CoinSet,
    pub(crate) records: HashMap<TxId, TransactionRecord>,
    pub(crate) addresses: AddressBook,
    pub(crate) eligibility: SelectionEligibility,
    pub(crate) stake_window: StakeWindow,
    pub(crate) last_block: Option<(u32, BlockHash)>,
}

pub struct WalletContext {
    name: String,
    keys: Arc<dyn KeyStore>,
    scanner: Arc<dyn OutputScanner>,
    chain: Arc<dyn Chain>,
    prover: Arc<dyn RangeProver>,
    config: EngineConfig,
    params: ChainParams,
    state: Mutex<WalletState>,
}

impl WalletContext {
    pub fn new(
        name: impl Into<String>,
        keys: Arc<dyn KeyStore>,
        chain: Arc<dyn Chain>,
        prover: Arc<dyn RangeProver>,
        config: EngineConfig,
    ) -> Self {
        let mut eligibility = SelectionEligibility::default();
        eligibility.set_min_confirmations(config.min_confirmations);
        let state = WalletState {
            coins: CoinSet::default(),
            records: HashMap::new(),
            addresses: AddressBook::new(keys.as_ref()),
            eligibility,
            stake_window: StakeWindow::default(),
            last_block: None,
        };
        Self {
            name: name.into(),
            scanner: Arc::new(StealthScanner::new(keys.clone())),
            keys,
            chain,
            prover,
            params: config.chain_params(),
            config,
            state: Mutex::new(state),
        }
    }

    /// Replaces the stealth scanner used by ingestion.
    pub fn with_scanner(mut self, scanner: Arc<dyn OutputScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn chain(&self) -> &dyn Chain {
        self.chain.as_ref()
    }

    pub(crate) fn keys(&self) -> &dyn KeyStore {
        self.keys.as_ref()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn new_transparent_address(&self) -> PublicKey {
        let mut state = self.lock();
        let index = state.addresses.next_index();
        state.addresses.reserve(index, false, self.keys.as_ref());
        self.keys.transparent_public_key(index)
    }

    pub fn stealth_address(&self) -> StealthAddress {
        self.keys.stealth_address()
    }

    /// A fresh receiving destination able to take `output_type` outputs.
    pub fn receiving_destination(&self, output_type: OutputType) -> Destination {
        match output_type {
            OutputType::Transparent => Destination::Transparent(self.new_transparent_address()),
            OutputType::Hidden | OutputType::Anonymous => {
                Destination::Stealth(self.stealth_address())
            }
        }
    }

    pub fn set_last_block_processed(&self, height: u32, hash: BlockHash) {
        self.lock().last_block = Some((height, hash));
    }

    pub fn last_block_processed(&self) -> Option<(u32, BlockHash)> {
        self.lock().last_block
    }

    /// Builds and signs a transaction. The wallet lock is held from coin
    /// selection through signing; on success the spent coins are pending
    /// and the record is stored, on failure nothing changes.
    pub fn build_transaction(&self, request: &BuildRequest) -> Result<BuildOutcome, WalletError> {
        let env = BuildEnv {
            keys: self.keys.as_ref(),
            chain: self.chain.as_ref(),
            prover: self.prover.as_ref(),
            config: &self.config,
        };
        let mut state = self.lock();
        let (outcome, effects) = builder::build_transaction(&env, &state, request)?;

        let txid = outcome.txid();
        state.coins.mark_pending(&effects.spent, txid);
        if let Some(index) = effects.change_key {
            state.addresses.reserve(index, true, self.keys.as_ref());
        }
        state.records.insert(txid, outcome.record.clone());
        info!(
            "{}: {} holds {} coins pending",
            self.name,
            txid,
            effects.spent.len()
        );
        Ok(outcome)
    }

    /// Relays a built transaction. A rejected transaction is abandoned.
    pub fn commit_transaction(&self, outcome: &BuildOutcome) -> Result<TxId, WalletError> {
        let txid = outcome.txid();
        match self.chain.submit(outcome.transaction.clone()) {
            Ok(()) | Err(RelayError::AlreadyKnown(_)) => {}
            Err(err) => {
                warn!("{}: relay of {} failed: {}", self.name, txid, err);
                self.abandon_transaction(&txid)?;
                return Err(err.into());
            }
        }
        self.add_to_wallet_if_involving_me(&outcome.transaction, None);
        Ok(txid)
    }

    pub fn send(&self, request: &BuildRequest) -> Result<BuildOutcome, WalletError> {
        let outcome = self.build_transaction(request)?;
        self.commit_transaction(&outcome)?;
        Ok(outcome)
    }

    /// Drops an unconfirmed transaction of ours and frees its inputs.
    pub fn abandon_transaction(&self, txid: &TxId) -> Result<(), WalletError> {
        let mut state = self.lock();
        let record = state
            .records
            .get(txid)
            .ok_or(WalletError::UnknownTransaction(*txid))?;
        if record.confirmation.is_some() {
            return Err(WalletError::InvalidRequest(format!(
                "{} is confirmed and cannot be abandoned",
                txid
            )));
        }
        state.remove_transaction(txid);
        info!("{}: abandoned {}", self.name, txid);
        Ok(())
    }

    /// Removes every trace of a transaction, confirmed or not, as after a
    /// reorg evicts it.
    pub fn forget_transaction(&self, txid: &TxId) -> Result<(), WalletError> {
        let mut state = self.lock();
        if !state.records.contains_key(txid) {
            return Err(WalletError::UnknownTransaction(*txid));
        }
        state.remove_transaction(txid);
        info!("{}: forgot {}", self.name, txid);
        Ok(())
    }

    pub fn balances(&self) -> Balances {
        let tip = self.chain.current_height();
        let state = self.lock();
        let mut accumulator = BalanceAccumulator::new(&state.eligibility, tip);
        accumulator.add_coins(state.coins.iter());
        accumulator.into_balances()
    }

    pub fn coins(&self) -> Vec<OwnedCoin> {
        self.lock().coins.iter().cloned().collect()
    }

    pub fn coin_set(&self) -> CoinSet {
        self.lock().coins.clone()
    }

    pub fn transaction_record(&self, txid: &TxId) -> Option<TransactionRecord> {
        self.lock().records.get(txid).cloned()
    }

    pub fn stake_window(&self) -> StakeWindow {
        self.lock().stake_window
    }

    pub fn freeze_coin(&self, outpoint: OutPoint) {
        self.lock().eligibility.freeze(outpoint);
    }

    pub fn unfreeze_coin(&self, outpoint: &OutPoint) {
        self.lock().eligibility.unfreeze(outpoint);
    }
}

impl WalletState {
    fn remove_transaction(&mut self, txid: &TxId) {
        self.coins.release(txid);
        self.coins.remove_created_by(txid);
        self.records.remove(txid);
    }
}

impl ChainListener for WalletContext {
    fn transaction_added_to_mempool(&self, tx: &Transaction) {
        self.add_to_wallet_if_involving_me(tx, None);
    }

    fn block_connected(&self, block: &Block, height: u32) {
        let confirmation = Confirmation {
            height,
            block_hash: block.hash(),
        };
        for tx in block.transactions.iter() {
            self.add_to_wallet_if_involving_me(tx, Some(confirmation));
        }
        self.set_last_block_processed(height, confirmation.block_hash);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::chain::{ChainView, Mempool};
    use crate::error::{RelayError, WalletError};
    use crate::test_utils::{pay, TestNet};
    use crate::types::{OutPoint, OutputType, COIN};
    use crate::wallet::builder::{BuildRequest, FundingStrategy};
    use crate::wallet::coin_set::CoinStatus;
    use crate::wallet::descriptor::OutputDescriptor;

    #[test]
    fn failed_build_leaves_wallet_untouched() {
        let net = TestNet::funded(&[COIN; 5]);
        let before = net.alice.coin_set();

        let request = pay(&net.bob, OutputType::Transparent, OutputType::Hidden, 6 * COIN);
        let result = net.alice.build_transaction(&request);
        assert!(matches!(result, Err(WalletError::InsufficientFunds(_))));
        assert!(!result.unwrap_err().reason().is_empty());
        assert_eq!(net.alice.coin_set(), before);
        assert_eq!(net.alice.balances().get(OutputType::Transparent).confirmed, 5 * COIN);
    }

    #[test]
    fn signing_failure_leaves_wallet_untouched() {
        let net = TestNet::funded(&[10 * COIN; 2]);
        let (carol, keys) = net.funded_wallet("carol", [6u8; 32], COIN);
        let before = carol.coin_set();
        keys.lock();

        let request = pay(&net.bob, OutputType::Transparent, OutputType::Transparent, COIN / 2);
        let result = carol.build_transaction(&request);
        assert!(matches!(result, Err(WalletError::SigningFailed(_))));
        assert_eq!(carol.coin_set(), before);
        assert!(carol.coins().iter().all(|c| c.is_unspent()));
        assert_eq!(carol.balances().get(OutputType::Transparent).pending_spend, 0);

        keys.unlock();
        let outcome = carol.build_transaction(&request).unwrap();
        assert_eq!(outcome.record.inputs.len(), 1);
    }

    #[test]
    fn frozen_coins_stay_out_of_selection() {
        let net = TestNet::funded(&[COIN, 2 * COIN]);
        let large = net
            .alice
            .coins()
            .into_iter()
            .find(|c| c.value == 2 * COIN)
            .unwrap()
            .outpoint;
        net.alice.freeze_coin(large);
        let balance = *net.alice.balances().get(OutputType::Transparent);
        assert_eq!(balance.frozen, 2 * COIN);
        assert_eq!(balance.confirmed, COIN);

        let request = pay(&net.bob, OutputType::Transparent, OutputType::Hidden, 3 * COIN / 2);
        assert!(matches!(
            net.alice.build_transaction(&request),
            Err(WalletError::InsufficientFunds(_))
        ));

        net.alice.unfreeze_coin(&large);
        let outcome = net.alice.build_transaction(&request).unwrap();
        assert!(outcome.record.inputs.iter().any(|i| i.prevout == Some(large)));
    }

    #[test]
    fn build_marks_inputs_pending_until_abandoned() {
        let net = TestNet::funded(&[COIN; 5]);
        let request = pay(&net.bob, OutputType::Transparent, OutputType::Transparent, COIN);
        let outcome = net.alice.build_transaction(&request).unwrap();

        let pending: Vec<_> = net
            .alice
            .coins()
            .into_iter()
            .filter(|c| c.status == CoinStatus::PendingSpend(outcome.txid()))
            .collect();
        assert_eq!(pending.len(), outcome.transaction.inputs.len());
        assert!(net.alice.balances().get(OutputType::Transparent).pending_spend >= COIN);

        net.alice.abandon_transaction(&outcome.txid()).unwrap();
        assert!(net.alice.coins().iter().all(|c| c.is_unspent()));
        assert!(net.alice.transaction_record(&outcome.txid()).is_none());
        assert!(matches!(
            net.alice.abandon_transaction(&outcome.txid()),
            Err(WalletError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn rejected_relay_abandons_build() {
        let net = TestNet::funded(&[COIN; 2]);
        let request = pay(&net.bob, OutputType::Transparent, OutputType::Transparent, COIN / 2);
        let mut outcome = net.alice.build_transaction(&request).unwrap();
        outcome.transaction.fee += 1;

        let result = net.alice.commit_transaction(&outcome);
        assert!(matches!(result, Err(WalletError::Relay(_))));
        assert!(net.alice.coins().iter().all(|c| c.is_unspent()));
        assert_eq!(net.ledger.mempool_len(), 0);
    }

    #[test]
    fn commit_then_confirm_then_forget() {
        let net = TestNet::funded(&[COIN; 3]);
        let request = pay(&net.bob, OutputType::Transparent, OutputType::Transparent, COIN / 2);
        let outcome = net.alice.send(&request).unwrap();
        assert!(net.ledger.mempool_contains(&outcome.txid()));
        assert!(matches!(
            net.ledger.submit(outcome.transaction.clone()),
            Err(RelayError::AlreadyKnown(_))
        ));

        net.stake(1);
        let record = net.alice.transaction_record(&outcome.txid()).unwrap();
        assert_eq!(record.confirmation.map(|c| c.height), Some(1));
        assert_eq!(net.alice.last_block_processed().map(|b| b.0), Some(1));
        assert!(matches!(
            net.alice.abandon_transaction(&outcome.txid()),
            Err(WalletError::InvalidRequest(_))
        ));
        let bob_value: u64 = net
            .bob
            .coins()
            .iter()
            .filter(|c| c.outpoint.txid == outcome.txid())
            .map(|c| c.value)
            .sum();
        assert_eq!(bob_value, COIN / 2);

        net.alice.forget_transaction(&outcome.txid()).unwrap();
        assert!(net
            .alice
            .coins()
            .iter()
            .all(|c| c.outpoint.txid != outcome.txid()));
        assert!(record
            .inputs
            .iter()
            .filter_map(|i| i.prevout)
            .all(|p| net.alice.coin_set().get(&p).map_or(false, |c| c.is_unspent())));
    }

    #[test]
    fn manual_funding_uses_only_listed_coins() {
        let net = TestNet::funded(&[COIN, 2 * COIN, 3 * COIN]);
        let smallest = net
            .alice
            .coins()
            .into_iter()
            .find(|c| c.value == COIN)
            .unwrap()
            .outpoint;
        let request = pay(&net.bob, OutputType::Transparent, OutputType::Hidden, COIN / 2)
            .with_funding(FundingStrategy::Manual(vec![smallest]));
        let outcome = net.alice.build_transaction(&request).unwrap();
        assert_eq!(outcome.record.inputs.len(), 1);
        assert_eq!(outcome.record.inputs[0].prevout, Some(smallest));

        let missing = OutPoint::new(outcome.txid(), 9);
        let request = pay(&net.bob, OutputType::Transparent, OutputType::Hidden, COIN / 2)
            .with_funding(FundingStrategy::Manual(vec![missing]));
        assert!(matches!(
            net.alice.build_transaction(&request),
            Err(WalletError::InvalidRequest(_))
        ));
    }

    #[test]
    fn empty_request_is_rejected() {
        let net = TestNet::funded(&[COIN]);
        let request = BuildRequest::new(OutputType::Transparent, vec![]);
        assert!(matches!(
            net.alice.build_transaction(&request),
            Err(WalletError::InvalidRequest(_))
        ));
        let descriptor = OutputDescriptor::new(
            net.bob.receiving_destination(OutputType::Hidden),
            0,
            OutputType::Hidden,
        )
        .unwrap();
        let request = BuildRequest::new(OutputType::Transparent, vec![descriptor]);
        assert!(matches!(
            net.alice.build_transaction(&request),
            Err(WalletError::InvalidRequest(_))
        ));
    }

    #[test]
    fn concurrent_builds_never_share_inputs() {
        let net = TestNet::funded(&[COIN; 24]);
        let alice = net.alice.clone();
        let bob = net.bob.clone();

        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let alice = Arc::clone(&alice);
                    let bob = Arc::clone(&bob);
                    scope.spawn(move || {
                        (0..3)
                            .map(|_| {
                                let request = pay(
                                    &bob,
                                    OutputType::Transparent,
                                    OutputType::Transparent,
                                    COIN / 2,
                                );
                                alice.build_transaction(&request)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let mut seen = HashSet::new();
        let mut built = 0;
        for outcome in outcomes.into_iter().flatten() {
            built += 1;
            for input in outcome.record.inputs.iter() {
                assert!(seen.insert(input.prevout.unwrap()), "input selected twice");
            }
        }
        assert_eq!(built, 24);
        assert_eq!(net.ledger.current_height(), 0);
    }
}
