//! Regtest fixtures for the add-transaction benchmark: a two-wallet network
//! with a funded sender, and the source/destination scenarios run on it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use itertools::iproduct;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::chain::Clock;
use crate::config::EngineConfig;
use crate::crypto::keys::{KeyStore, SeedKeyStore};
use crate::crypto::range_proof::{OpeningProver, RangeProver};
use crate::crypto::SecretKey;
use crate::error::WalletError;
use crate::ledger::MemoryLedger;
use crate::staking::assembler::{BlockAssembler, StakeReport};
use crate::tx::Transaction;
use crate::types::{Amount, OutputType, COIN};
use crate::wallet::address_mapper::{AddressMapper, StringAddressMapper};
use crate::wallet::builder::{BuildOutcome, BuildRequest};
use crate::wallet::descriptor::{Destination, OutputDescriptor};
use crate::wallet::ingest::OutputScanner;
use crate::wallet::WalletContext;

pub const SENDER_PHRASE: &str =
    "abandon ability able about above absent absorb abstract absurd abuse access accident";
pub const RECEIVER_PHRASE: &str =
    "expect trouble pause odor utility palace ignore arena disorder frog helmet addict";

/// Value of the payment each scenario builds.
pub const PAYMENT: Amount = 1000;
/// Coins of the source type the sender holds before a scenario runs.
pub const SOURCE_COINS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub engine: EngineConfig,
    pub output_path: PathBuf,
    /// ingestions timed per scenario
    pub iterations: u64,
    /// 10-unit coins the genesis block pays the sender
    pub genesis_coins: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            output_path: PathBuf::from("add_tx_bench.csv"),
            iterations: 100,
            genesis_coins: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddTxScenario {
    pub from: OutputType,
    pub to: OutputType,
    /// whether the receiving wallet owns the payment output
    pub owned: bool,
}

impl AddTxScenario {
    pub fn all() -> impl Iterator<Item = AddTxScenario> {
        iproduct!(OutputType::ALL, OutputType::ALL, [true, false])
            .map(|(from, to, owned)| AddTxScenario { from, to, owned })
    }
}

impl fmt::Display for AddTxScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}{}",
            self.from.as_str(),
            self.to.as_str(),
            if self.owned { "" } else { "-foreign" }
        )
    }
}

/// A ledger plus a sender (`alice`) and a receiver (`bob`), both subscribed.
pub struct Harness {
    pub config: EngineConfig,
    pub clock: Arc<dyn Clock>,
    pub ledger: Arc<MemoryLedger>,
    pub alice: Arc<WalletContext>,
    pub bob: Arc<WalletContext>,
}

impl Harness {
    /// Genesis pays one transparent coin per `funding` entry to the
    /// sender's first keys.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>, funding: &[Amount]) -> Self {
        let prover: Arc<dyn RangeProver> = Arc::new(OpeningProver);
        let sender_keys = Arc::new(SeedKeyStore::from_phrase(SENDER_PHRASE));
        let genesis: Vec<_> = funding
            .iter()
            .enumerate()
            .map(|(index, value)| (sender_keys.transparent_public_key(index as u32), *value))
            .collect();
        let ledger = Arc::new(MemoryLedger::new(
            config.chain_params(),
            clock.clone(),
            prover,
            &genesis,
        ));

        Self {
            alice: attach_wallet(&ledger, &config, "alice", sender_keys, None),
            bob: attach_wallet(
                &ledger,
                &config,
                "bob",
                Arc::new(SeedKeyStore::from_phrase(RECEIVER_PHRASE)),
                None,
            ),
            config,
            clock,
            ledger,
        }
    }

    /// Another wallet on the same ledger.
    pub fn wallet(
        &self,
        name: &str,
        keys: Arc<dyn KeyStore>,
        scanner: Option<Arc<dyn OutputScanner>>,
    ) -> Arc<WalletContext> {
        attach_wallet(&self.ledger, &self.config, name, keys, scanner)
    }

    /// The sender stakes `blocks` blocks on top of the current tip.
    pub fn stake(&self, blocks: usize) -> Result<StakeReport, WalletError> {
        BlockAssembler::new(&self.alice, self.clock.as_ref(), &self.config.stake)
            .with_coinbase_script(self.alice.name().as_bytes().to_vec())
            .stake_blocks(blocks)
    }

    /// Relays a transparent-funded transaction paying `count` coins of
    /// `value` to `wallet` itself.
    pub fn fund_self(
        &self,
        wallet: &WalletContext,
        output_type: OutputType,
        count: usize,
        value: Amount,
    ) -> Result<BuildOutcome, WalletError> {
        let descriptors = (0..count)
            .map(|_| {
                OutputDescriptor::new(wallet.receiving_destination(output_type), value, output_type)
            })
            .collect::<Result<Vec<_>, _>>()?;
        wallet.send(&BuildRequest::new(OutputType::Transparent, descriptors))
    }

    /// Gives the sender `SOURCE_COINS` confirmed coins of `source`.
    pub fn prepare_sender(&self, source: OutputType) -> Result<(), WalletError> {
        let outcome = self.fund_self(&self.alice, source, SOURCE_COINS, COIN)?;
        self.stake(2)?;
        info!(
            "sender funded with {} {} coins in {}",
            SOURCE_COINS,
            source.as_str(),
            outcome.txid()
        );
        Ok(())
    }

    /// Builds, without relaying, the scenario's payment from the sender.
    pub fn build_payment(&self, scenario: &AddTxScenario) -> Result<BuildOutcome, WalletError> {
        let destination = if scenario.owned {
            self.bob.receiving_destination(scenario.to)
        } else {
            foreign_destination(scenario.to)
        };
        // the receiver hands its address over as a string
        let mapper = StringAddressMapper::default();
        let encoded = mapper.map_destination(&destination);
        let destination = mapper.map_address_for(&encoded, scenario.to)?;
        let descriptor = OutputDescriptor::new(destination, PAYMENT, scenario.to)?;
        self.alice
            .build_transaction(&BuildRequest::new(scenario.from, vec![descriptor]))
    }
}

fn attach_wallet(
    ledger: &Arc<MemoryLedger>,
    config: &EngineConfig,
    name: &str,
    keys: Arc<dyn KeyStore>,
    scanner: Option<Arc<dyn OutputScanner>>,
) -> Arc<WalletContext> {
    let mut wallet = WalletContext::new(
        name,
        keys,
        ledger.clone(),
        Arc::new(OpeningProver),
        config.clone(),
    );
    if let Some(scanner) = scanner {
        wallet = wallet.with_scanner(scanner);
    }
    let wallet = Arc::new(wallet);
    ledger.subscribe(wallet.clone());
    wallet
}

/// A destination no harness wallet can open.
pub fn foreign_destination(output_type: OutputType) -> Destination {
    let mut rng = rand::thread_rng();
    match output_type {
        OutputType::Transparent => {
            Destination::Transparent(SecretKey::random(&mut rng).public_key())
        }
        OutputType::Hidden | OutputType::Anonymous => {
            Destination::Stealth(SeedKeyStore::from_seed(rng.gen()).stealth_address())
        }
    }
}

/// Feeds `tx` to `wallet` `iterations` times, timing each call.
pub fn measure_ingestion(
    wallet: &WalletContext,
    tx: &Transaction,
    iterations: u64,
) -> Vec<(Duration, bool)> {
    (0..iterations)
        .map(|_| {
            let started = Instant::now();
            let involved = wallet.add_to_wallet_if_involving_me(tx, None);
            (started.elapsed(), involved)
        })
        .collect()
}
