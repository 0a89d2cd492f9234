use sha2::{Digest, Sha256};

use crate::chain::{ChainTip, OutputLookup};
use crate::config::ChainParams;
use crate::crypto::signature::verify;
use crate::error::{RelayError, StakeError};
use crate::tx::{Block, TxInput, TxOutput};
use crate::types::{Amount, BlockHash, Hash256, OutPoint};

/// Per-coin, per-time hash a staker grinds over.
pub fn stake_kernel_hash(prev_hash: &BlockHash, prevout: &OutPoint, search_time: u64) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(b"ringstake/kernel");
    hasher.update(prev_hash.as_bytes());
    hasher.update(prevout.txid.as_bytes());
    hasher.update(prevout.index.to_le_bytes());
    hasher.update(search_time.to_le_bytes());
    Hash256(hasher.finalize().into())
}

/// Larger coins get a proportionally larger target.
pub fn meets_target(hash: &Hash256, value: Amount, target_per_unit: u64) -> bool {
    (hash.low_u64() as u128) <= target_per_unit as u128 * value as u128
}

/// Context-dependent stake check of a block built on `tip`.
pub fn check_stake<L: OutputLookup + ?Sized>(
    params: &ChainParams,
    block: &Block,
    tip: &ChainTip,
    lookup: &L,
) -> Result<(), StakeError> {
    let coinstake = block.coinstake().ok_or(StakeError::MissingCoinstake)?;
    let header = &block.header;

    if header.prev_hash != tip.hash || header.height != tip.height + 1 {
        return Err(StakeError::WrongParent);
    }
    if params.mask_time(header.time) != header.time {
        return Err(StakeError::UnalignedTime(header.time));
    }
    if header.time <= tip.time {
        return Err(StakeError::TimeTooOld {
            time: header.time,
            tip_time: tip.time,
        });
    }
    if header.tx_root != Block::compute_tx_root(&block.transactions) {
        return Err(RelayError::Malformed("transaction root mismatch".to_string()).into());
    }

    let prevout = match coinstake.inputs.as_slice() {
        [TxInput::Transparent { prevout }] => *prevout,
        _ => return Err(StakeError::MissingCoinstake),
    };
    let staked = lookup
        .lookup_output(&prevout)
        .ok_or(StakeError::IneligibleCoin(prevout))?;
    let depth = tip.height.saturating_sub(staked.height) + 1;
    let (owner, value) = match &staked.output {
        TxOutput::Transparent(plain) if depth >= params.min_stake_depth => {
            (plain.address, plain.value)
        }
        _ => return Err(StakeError::IneligibleCoin(prevout)),
    };

    let kernel = stake_kernel_hash(&tip.hash, &prevout, header.time);
    if !meets_target(&kernel, value, params.stake_target) {
        return Err(StakeError::KernelTargetMissed);
    }

    let signature = block
        .signature
        .as_ref()
        .ok_or(StakeError::InvalidBlockSignature)?;
    if !verify(&owner, header.hash().as_bytes(), signature) {
        return Err(StakeError::InvalidBlockSignature);
    }

    let fees: Amount = block.transactions.iter().skip(1).map(|tx| tx.fee).sum();
    let allowed = value + params.stake_reward + fees;
    let paid = coinstake
        .outputs
        .iter()
        .try_fold(0u64, |acc, o| acc.checked_add(o.plain_value()?))
        .ok_or_else(|| RelayError::Malformed("coinstake pays to committed outputs".to_string()))?;
    if paid > allowed {
        return Err(StakeError::CoinstakeOverpays { paid, allowed });
    }
    Ok(())
}
