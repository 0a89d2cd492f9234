use std::ops::Deref;
use std::sync::Arc;

use crate::chain::ManualClock;
use crate::config::EngineConfig;
use crate::crypto::keys::SeedKeyStore;
use crate::scenario::Harness;
use crate::staking::assembler::StakeReport;
use crate::types::{Amount, OutputType};
use crate::wallet::builder::BuildRequest;
use crate::wallet::descriptor::OutputDescriptor;
use crate::wallet::ingest::OutputScanner;
use crate::wallet::WalletContext;

pub(crate) const START_TIME: u64 = 1_600_000_000;

/// A regtest harness on a manual clock, so staking never blocks.
pub(crate) struct TestNet {
    pub clock: Arc<ManualClock>,
    harness: Harness,
}

impl TestNet {
    pub fn funded(funding: &[Amount]) -> Self {
        let clock = Arc::new(ManualClock::new(START_TIME));
        let harness = Harness::new(EngineConfig::default(), clock.clone(), funding);
        Self { clock, harness }
    }

    pub fn wallet(&self, name: &str, seed: [u8; 32]) -> Arc<WalletContext> {
        self.harness
            .wallet(name, Arc::new(SeedKeyStore::from_seed(seed)), None)
    }

    pub fn wallet_with_scanner(
        &self,
        name: &str,
        seed: [u8; 32],
        scanner: Arc<dyn OutputScanner>,
    ) -> Arc<WalletContext> {
        self.harness
            .wallet(name, Arc::new(SeedKeyStore::from_seed(seed)), Some(scanner))
    }

    pub fn stake(&self, blocks: usize) -> StakeReport {
        self.harness.stake(blocks).unwrap()
    }

    /// A wallet holding one confirmed transparent coin of `amount` paid by
    /// alice, together with its key store so tests can lock it.
    pub fn funded_wallet(
        &self,
        name: &str,
        seed: [u8; 32],
        amount: Amount,
    ) -> (Arc<WalletContext>, Arc<SeedKeyStore>) {
        let keys = Arc::new(SeedKeyStore::from_seed(seed));
        let wallet = self.harness.wallet(name, keys.clone(), None);
        let request = pay(&wallet, OutputType::Transparent, OutputType::Transparent, amount);
        self.alice.send(&request).unwrap();
        self.stake(1);
        (wallet, keys)
    }
}

impl Deref for TestNet {
    type Target = Harness;

    fn deref(&self) -> &Harness {
        &self.harness
    }
}

/// A one-output request paying `amount` of `output_type` to `to`.
pub(crate) fn pay(
    to: &WalletContext,
    source: OutputType,
    output_type: OutputType,
    amount: Amount,
) -> BuildRequest {
    let descriptor =
        OutputDescriptor::new(to.receiving_destination(output_type), amount, output_type).unwrap();
    BuildRequest::new(source, vec![descriptor])
}
