use tracing::{debug, info, warn};

use crate::chain::ChainTip;
use crate::crypto::signature::sign;
use crate::error::WalletError;
use crate::staking::kernel::{check_stake, meets_target, stake_kernel_hash};
use crate::tx::{
    Block, BlockHeader, BlockTemplate, InputWitness, PlainOutput, Transaction, TxInput, TxKind,
    TxOutput,
};
use crate::types::BlockHash;
use crate::wallet::WalletContext;

impl WalletContext {
    /// Tries every stake-eligible coin against `search_time` and signs a
    /// block on top of `template` with the first one that meets the target.
    ///
    /// The stake window is advanced first; a time that is not strictly
    /// after the last attempt yields `None` without any kernel check.
    pub fn sign_block(
        &self,
        template: &BlockTemplate,
        search_time: u64,
    ) -> Result<Option<Block>, WalletError> {
        let params = *self.params();
        let tip = ChainTip {
            height: template.height.saturating_sub(1),
            hash: template.prev_hash,
            time: template.prev_time,
        };

        let mut state = self.lock();
        if !state.stake_window.advance(tip.height, search_time) {
            debug!("{}: search time {} already tried", self.name(), search_time);
            return Ok(None);
        }
        if search_time <= tip.time {
            debug!(
                "{}: search time {} not after tip time {}",
                self.name(),
                search_time,
                tip.time
            );
            return Ok(None);
        }

        let staked = state
            .coins
            .unspent()
            .filter(|coin| state.eligibility.is_stakeable(coin, tip.height, &params))
            .find(|coin| {
                let kernel = stake_kernel_hash(&tip.hash, &coin.outpoint, search_time);
                meets_target(&kernel, coin.value, params.stake_target)
            })
            .cloned();
        let coin = match staked {
            Some(coin) => coin,
            None => {
                debug!("{}: no kernel at {}", self.name(), search_time);
                return Ok(None);
            }
        };
        let secret = match self.keys().derive_spend_key(&coin.origin) {
            Some(secret) => secret,
            None => {
                warn!(
                    "{}: stake key for {} unavailable, key store locked?",
                    self.name(),
                    coin.outpoint
                );
                return Ok(None);
            }
        };

        let mut rng = rand::thread_rng();
        let mut coinstake = Transaction {
            version: Transaction::VERSION,
            kind: TxKind::Coinstake,
            inputs: vec![TxInput::Transparent {
                prevout: coin.outpoint,
            }],
            outputs: vec![TxOutput::Transparent(PlainOutput {
                address: coin.owner_key,
                value: coin.value + params.stake_reward + template.fees,
            })],
            fee: 0,
            kernel: None,
            witness: vec![],
        };
        let coinstake_id = coinstake.txid();
        coinstake
            .witness
            .push(InputWitness::Key(sign(&secret, coinstake_id.as_bytes(), &mut rng)));

        let mut transactions = Vec::with_capacity(template.transactions.len() + 1);
        transactions.push(coinstake);
        transactions.extend(template.transactions.iter().cloned());
        let header = BlockHeader {
            height: template.height,
            prev_hash: template.prev_hash,
            time: search_time,
            tx_root: Block::compute_tx_root(&transactions),
        };
        let signature = sign(&secret, header.hash().as_bytes(), &mut rng);
        let block = Block {
            header,
            transactions,
            signature: Some(signature),
        };

        if let Err(err) = check_stake(&params, &block, &tip, self.chain()) {
            warn!("{}: staked block fails its own check: {}", self.name(), err);
            return Ok(None);
        }
        state.coins.mark_pending(&[coin.outpoint], coinstake_id);
        info!(
            "{}: staked {} at height {} with {} ({} units)",
            self.name(),
            block.hash(),
            block.header.height,
            coin.outpoint,
            coin.value
        );
        Ok(Some(block))
    }

    /// One assembler attempt: fetch a template, sign, hand the block to
    /// the node. A block the node rejects frees its stake coin again.
    pub fn try_stake(
        &self,
        coinbase_script: &[u8],
        search_time: u64,
    ) -> Result<Option<BlockHash>, WalletError> {
        let template = self.chain().create_template(coinbase_script, true);
        let block = match self.sign_block(&template, search_time)? {
            Some(block) => block,
            None => return Ok(None),
        };
        let coinstake_id = block.coinstake().map(Transaction::txid);
        match self.chain().process_block(block) {
            Ok(hash) => Ok(Some(hash)),
            Err(err) => {
                warn!("{}: staked block rejected: {}", self.name(), err);
                if let Some(txid) = coinstake_id {
                    self.lock().coins.release(&txid);
                }
                Ok(None)
            }
        }
    }
}
