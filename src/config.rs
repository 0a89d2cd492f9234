use crate::error::WalletError;
use crate::types::{Amount, COIN};
use serde::Deserialize;
use std::time::Duration;

/// Networks the engine knows consensus constants for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Default for Network {
    fn default() -> Self {
        Network::Regtest
    }
}

/// Static consensus parameters consumed by staking and block checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    /// Low bits cleared from every stake search time.
    pub stake_timestamp_mask: u64,
    /// Confirmations a coin needs before it may stake.
    pub min_stake_depth: u32,
    /// Kernel target per base unit of staked value.
    pub stake_target: u64,
    /// New coins paid by every coinstake.
    pub stake_reward: Amount,
}

impl ChainParams {
    pub const MAINNET: Self = Self {
        stake_timestamp_mask: 0xf,
        min_stake_depth: 225,
        stake_target: 1 << 10,
        stake_reward: 2 * COIN,
    };

    pub const TESTNET: Self = Self {
        stake_timestamp_mask: 0xf,
        min_stake_depth: 10,
        stake_target: 1 << 16,
        stake_reward: 2 * COIN,
    };

    /// Every coin of at least one unit passes the kernel check.
    pub const REGTEST: Self = Self {
        stake_timestamp_mask: 0xf,
        min_stake_depth: 1,
        stake_target: u64::MAX / COIN,
        stake_reward: 2 * COIN,
    };

    pub const fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::MAINNET,
            Network::Testnet => Self::TESTNET,
            Network::Regtest => Self::REGTEST,
        }
    }

    /// Search time for `time`, rounded down onto the mask grid.
    pub fn mask_time(&self, time: u64) -> u64 {
        time & !self.stake_timestamp_mask
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeeConfig {
    /// Fee per 1000 bytes of estimated transaction size.
    pub rate_per_kb: Amount,
    pub min_fee: Amount,
    /// Change at or below this value is added to the fee instead.
    pub dust_threshold: Amount,
    /// Upper bound on select / estimate rounds.
    pub max_iterations: usize,
    /// Fee difference accepted as converged between two rounds.
    pub tolerance: Amount,
    /// Bytes attributed to each committed output's range proof.
    pub range_proof_size: usize,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            rate_per_kb: 20_000,
            min_fee: 1_000,
            dust_threshold: 5_460,
            max_iterations: 16,
            tolerance: 0,
            range_proof_size: 675,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StakeConfig {
    /// Assembler cycles before giving up.
    pub max_attempts: usize,
    /// Sleep between cycles, in milliseconds.
    pub backoff_ms: u64,
}

impl StakeConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10_000,
            backoff_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub network: Network,
    pub fee: FeeConfig,
    pub stake: StakeConfig,
    /// Ring members per anonymous input, the real one included.
    pub default_ring_size: usize,
    /// Confirmations a coin needs before selection may spend it.
    pub min_confirmations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            fee: FeeConfig::default(),
            stake: StakeConfig::default(),
            default_ring_size: 5,
            min_confirmations: 1,
        }
    }
}

impl EngineConfig {
    pub fn chain_params(&self) -> ChainParams {
        ChainParams::for_network(self.network)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.default_ring_size == 0 {
            return Err(WalletError::Config(
                "default_ring_size must be at least 1".to_string(),
            ));
        }
        if self.min_confirmations == 0 {
            return Err(WalletError::Config(
                "min_confirmations must be at least 1".to_string(),
            ));
        }
        if self.fee.max_iterations == 0 {
            return Err(WalletError::Config(
                "fee.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.stake.max_attempts == 0 {
            return Err(WalletError::Config(
                "stake.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
