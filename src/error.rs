use crate::types::{Amount, OutPoint, OutputType, TxId};
use thiserror::Error;

/// Reasons the ledger refuses a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("input {0} is unknown or already spent")]
    MissingInput(OutPoint),
    #[error("input {0} is spent twice")]
    DuplicateInput(OutPoint),
    #[error("input {0} conflicts with a mempool transaction")]
    MempoolConflict(OutPoint),
    #[error("key image {0} already spent")]
    KeyImageSpent(String),
    #[error("ring member {0} is not in the anonymity set")]
    UnknownRingMember(u64),
    #[error("input {index} carries an invalid signature")]
    InvalidSignature { index: usize },
    #[error("balance kernel is missing or invalid")]
    InvalidKernel,
    #[error("commitments do not balance")]
    Unbalanced,
    #[error("range proof for output {index} is invalid")]
    InvalidRangeProof { index: usize },
    #[error("malformed transaction: {0}")]
    Malformed(String),
    #[error("transaction {0} already known")]
    AlreadyKnown(TxId),
}

/// Reasons a staked block is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("block carries no coinstake")]
    MissingCoinstake,
    #[error("block does not extend the current tip")]
    WrongParent,
    #[error("block time {0} is not aligned to the stake timestamp mask")]
    UnalignedTime(u64),
    #[error("block time {time} does not advance past the tip time {tip_time}")]
    TimeTooOld { time: u64, tip_time: u64 },
    #[error("stake coin {0} is unknown or immature")]
    IneligibleCoin(OutPoint),
    #[error("kernel hash does not meet the target")]
    KernelTargetMissed,
    #[error("block signature is invalid")]
    InvalidBlockSignature,
    #[error("coinstake pays {paid}, at most {allowed} allowed")]
    CoinstakeOverpays { paid: Amount, allowed: Amount },
    #[error("block transaction rejected: {0}")]
    Transaction(#[from] RelayError),
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("invalid destination for {output_type} output: {reason}")]
    InvalidDestinationForType {
        output_type: OutputType,
        reason: String,
    },
    #[error("decoy set exhausted: ring of {needed} needs {decoys} decoys, {available} available")]
    DecoySetExhausted {
        needed: usize,
        decoys: usize,
        available: u64,
    },
    #[error("fee estimation did not converge after {iterations} iterations")]
    FeeEstimationDivergence { iterations: usize },
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("relay failed: {0}")]
    Relay(#[from] RelayError),
    #[error("no block staked after {attempts} cycles")]
    StakeAttemptsExhausted { attempts: usize },
    #[error("staking stopped by caller")]
    StakeCancelled,
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxId),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("config error: {0}")]
    Config(String),
}

impl WalletError {
    /// Short message suitable for showing to a wallet user.
    pub fn reason(&self) -> String {
        match self {
            Self::InsufficientFunds(msg) => format!("Not enough spendable coins: {}", msg),
            Self::InvalidDestinationForType {
                output_type,
                reason,
            } => format!("Address cannot receive {} outputs: {}", output_type, reason),
            Self::DecoySetExhausted {
                needed, available, ..
            } => format!(
                "Ring size {} is larger than the {} anonymous outputs on chain",
                needed, available
            ),
            Self::FeeEstimationDivergence { .. } => {
                "Could not settle on a transaction fee".to_string()
            }
            Self::SigningFailed(msg) => format!("Signing failed: {}", msg),
            Self::Relay(err) => format!("Transaction rejected: {}", err),
            Self::StakeAttemptsExhausted { attempts } => {
                format!("No block found after {} attempts", attempts)
            }
            Self::StakeCancelled => "Staking was stopped".to_string(),
            Self::UnknownTransaction(txid) => format!("Transaction {} not in wallet", txid),
            Self::InvalidRequest(msg) => format!("Invalid request: {}", msg),
            Self::Config(msg) => format!("Bad configuration: {}", msg),
        }
    }
}
