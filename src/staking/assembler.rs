//! The staking loop, written as an explicit state machine so every wait
//! and retry is visible to a test driving it with a manual clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::chain::Clock;
use crate::config::StakeConfig;
use crate::error::WalletError;
use crate::types::BlockHash;
use crate::wallet::WalletContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    ComputeSearchTime,
    WaitIfTooEarly { search_time: u64 },
    AttemptBlock { height: u32, search_time: u64 },
    Success(BlockHash),
    RetryIdle,
}

/// What a run of the assembler did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StakeReport {
    pub blocks: Vec<BlockHash>,
    pub cycles: usize,
    pub waits: usize,
    pub attempts: usize,
    /// every search time handed to the signer, in order
    pub attempted_search_times: Vec<u64>,
}

pub struct BlockAssembler<'a> {
    wallet: &'a WalletContext,
    clock: &'a dyn Clock,
    config: StakeConfig,
    coinbase_script: Vec<u8>,
    stop: Option<Arc<AtomicBool>>,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(wallet: &'a WalletContext, clock: &'a dyn Clock, config: &StakeConfig) -> Self {
        Self {
            wallet,
            clock,
            config: config.clone(),
            coinbase_script: vec![],
            stop: None,
        }
    }

    /// The loop ends with `StakeCancelled` at the next idle state after
    /// `stop` is raised.
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_coinbase_script(mut self, script: Vec<u8>) -> Self {
        self.coinbase_script = script;
        self
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .map_or(false, |stop| stop.load(Ordering::SeqCst))
    }

    fn step(
        &self,
        state: AssemblerState,
        report: &mut StakeReport,
    ) -> Result<AssemblerState, WalletError> {
        let next = match state {
            AssemblerState::Idle => {
                if self.stopped() {
                    return Err(WalletError::StakeCancelled);
                }
                if report.cycles >= self.config.max_attempts {
                    return Err(WalletError::StakeAttemptsExhausted {
                        attempts: report.cycles,
                    });
                }
                report.cycles += 1;
                AssemblerState::ComputeSearchTime
            }
            AssemblerState::ComputeSearchTime => {
                let search_time = self.wallet.params().mask_time(self.clock.adjusted_time());
                if self.wallet.stake_window().is_consumed(search_time) {
                    AssemblerState::WaitIfTooEarly { search_time }
                } else {
                    AssemblerState::AttemptBlock {
                        height: self.wallet.chain().current_height() + 1,
                        search_time,
                    }
                }
            }
            AssemblerState::WaitIfTooEarly { search_time } => {
                debug!(
                    "{}: search time {} already used, waiting",
                    self.wallet.name(),
                    search_time
                );
                report.waits += 1;
                self.clock.sleep(self.config.backoff());
                AssemblerState::Idle
            }
            AssemblerState::AttemptBlock {
                height,
                search_time,
            } => {
                report.attempts += 1;
                report.attempted_search_times.push(search_time);
                match self.wallet.try_stake(&self.coinbase_script, search_time)? {
                    Some(hash) => AssemblerState::Success(hash),
                    None => {
                        debug!(
                            "{}: no block at height {} for {}",
                            self.wallet.name(),
                            height,
                            search_time
                        );
                        AssemblerState::RetryIdle
                    }
                }
            }
            AssemblerState::Success(hash) => {
                info!("{}: block {} accepted", self.wallet.name(), hash);
                report.blocks.push(hash);
                AssemblerState::Idle
            }
            AssemblerState::RetryIdle => {
                self.clock.sleep(self.config.backoff());
                AssemblerState::Idle
            }
        };
        Ok(next)
    }

    /// Runs until `count` blocks were accepted by the node.
    pub fn stake_blocks(&self, count: usize) -> Result<StakeReport, WalletError> {
        let mut report = StakeReport::default();
        let mut state = AssemblerState::Idle;
        while report.blocks.len() < count {
            state = self.step(state, &mut report)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use itertools::Itertools;

    use crate::chain::{ChainView, Clock};
    use crate::config::StakeConfig;
    use crate::error::WalletError;
    use crate::staking::assembler::BlockAssembler;
    use crate::test_utils::TestNet;
    use crate::types::{OutputType, COIN};

    #[test]
    fn staked_blocks_have_increasing_times() {
        let net = TestNet::funded(&[COIN; 4]);
        let report = net.stake(3);
        assert_eq!(report.blocks.len(), 3);
        assert_eq!(net.ledger.current_height(), 3);
        assert!(report
            .attempted_search_times
            .iter()
            .tuple_windows()
            .all(|(a, b)| a < b));

        let times: Vec<u64> = (1..=3)
            .map(|h| net.ledger.block(h).unwrap().header.time)
            .collect();
        assert!(times.iter().tuple_windows().all(|(a, b)| a < b));
        assert_eq!(net.alice.stake_window().last_search_time, times[2]);
        // coin value, reward and nothing else: no fees in these blocks
        let balances = net.alice.balances();
        let balance = balances.get(OutputType::Transparent);
        assert_eq!(balance.total(), 4 * COIN + 3 * net.ledger.params().stake_reward);
    }

    #[test]
    fn consumed_search_time_waits_for_the_next_slot() {
        let net = TestNet::funded(&[COIN; 2]);
        let first = net.stake(1);
        let used = first.attempted_search_times[0];
        let sleeps = net.clock.sleep_count();

        let second = net.stake(1);
        assert!(second.waits > 0);
        assert!(net.clock.sleep_count() > sleeps);
        assert!(!second.attempted_search_times.contains(&used));
        let unique: HashSet<_> = second.attempted_search_times.iter().collect();
        assert_eq!(unique.len(), second.attempted_search_times.len());
        assert!(net.clock.adjusted_time() > used);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let net = TestNet::funded(&[]);
        let config = StakeConfig {
            max_attempts: 5,
            backoff_ms: 250,
        };
        let assembler = BlockAssembler::new(&net.alice, net.clock.as_ref(), &config);
        match assembler.stake_blocks(1) {
            Err(WalletError::StakeAttemptsExhausted { attempts }) => assert_eq!(attempts, 5),
            other => panic!("unexpected {:?}", other.map(|r| r.blocks)),
        }
        assert_eq!(net.ledger.current_height(), 0);
    }

    #[test]
    fn locked_keys_retry_until_attempts_run_out() {
        let net = TestNet::funded(&[10 * COIN; 2]);
        let (carol, keys) = net.funded_wallet("carol", [4u8; 32], COIN);
        assert_eq!(carol.balances().get(OutputType::Transparent).confirmed, COIN);
        keys.lock();

        let sleeps = net.clock.sleep_count();
        // one mask step per retry, so every cycle after the first finds a kernel
        let config = StakeConfig {
            max_attempts: 5,
            backoff_ms: 16_000,
        };
        let assembler = BlockAssembler::new(&carol, net.clock.as_ref(), &config);
        match assembler.stake_blocks(1) {
            Err(WalletError::StakeAttemptsExhausted { attempts }) => assert_eq!(attempts, 5),
            other => panic!("unexpected {:?}", other.map(|r| r.blocks)),
        }
        assert!(net.clock.sleep_count() >= sleeps + 4);
        assert_eq!(net.ledger.current_height(), 1);
        assert!(carol.coins().iter().all(|c| c.is_unspent()));
    }

    #[test]
    fn stop_signal_cancels() {
        let net = TestNet::funded(&[COIN]);
        let stop = Arc::new(AtomicBool::new(true));
        let assembler = BlockAssembler::new(&net.alice, net.clock.as_ref(), &net.config.stake)
            .with_stop_signal(stop);
        assert!(matches!(
            assembler.stake_blocks(1),
            Err(WalletError::StakeCancelled)
        ));
        assert_eq!(net.clock.sleep_count(), 0);
    }
}
