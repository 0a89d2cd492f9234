pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod scenario;
pub mod staking;
pub mod stats;
pub mod tx;
pub mod types;
pub mod validation;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{RelayError, StakeError, WalletError};
pub use types::{Amount, OutPoint, OutputType, COIN};
