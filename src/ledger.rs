//! In-process regtest node: UTXO set, anonymity set, key images, a mempool
//! and listener fan-out. Listeners are always called after the ledger lock
//! is released so they may call back into the ledger.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::chain::{
    AnonMember, AnonSet, BlockSink, BlockTemplateSource, ChainListener, ChainTip, ChainView,
    Clock, LedgerOutput, Mempool, OutputLookup,
};
use crate::config::ChainParams;
use crate::crypto::range_proof::RangeProver;
use crate::crypto::signature::KeyImage;
use crate::crypto::PublicKey;
use crate::error::{RelayError, StakeError};
use crate::staking::kernel::check_stake;
use crate::tx::{
    Block, BlockHeader, BlockTemplate, PlainOutput, Transaction, TxInput, TxKind, TxOutput,
};
use crate::types::{Amount, BlockHash, OutPoint, TxId};
use crate::validation::{check_transaction, ValidationView};

#[derive(Clone)]
struct ChainState {
    tip: ChainTip,
    utxos: HashMap<OutPoint, LedgerOutput>,
    anon_outputs: Vec<(OutPoint, AnonMember)>,
    anon_index: HashMap<OutPoint, u64>,
    key_images: HashSet<KeyImage>,
}

impl ChainState {
    fn apply(&mut self, tx: &Transaction, height: u32) {
        let txid = tx.txid();
        for input in tx.inputs.iter() {
            match input {
                TxInput::Transparent { prevout } | TxInput::Hidden { prevout } => {
                    self.utxos.remove(prevout);
                }
                TxInput::Anonymous { key_image, .. } => {
                    self.key_images.insert(*key_image);
                }
            }
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint::new(txid, index as u32);
            match output {
                TxOutput::Anonymous(blind) => {
                    self.anon_index
                        .insert(outpoint, self.anon_outputs.len() as u64);
                    self.anon_outputs.push((
                        outpoint,
                        AnonMember {
                            one_time_key: blind.one_time_key,
                            commitment: blind.commitment,
                        },
                    ));
                }
                _ => {
                    self.utxos.insert(
                        outpoint,
                        LedgerOutput {
                            output: output.clone(),
                            height,
                            kind: tx.kind,
                        },
                    );
                }
            }
        }
    }
}

impl OutputLookup for ChainState {
    fn lookup_output(&self, outpoint: &OutPoint) -> Option<LedgerOutput> {
        self.utxos.get(outpoint).cloned()
    }
}

impl AnonSet for ChainState {
    fn anon_count(&self) -> u64 {
        self.anon_outputs.len() as u64
    }

    fn anon_member(&self, index: u64) -> Option<AnonMember> {
        self.anon_outputs.get(index as usize).map(|(_, member)| *member)
    }

    fn anon_index_of(&self, outpoint: &OutPoint) -> Option<u64> {
        self.anon_index.get(outpoint).copied()
    }
}

impl ValidationView for ChainState {
    fn key_image_spent(&self, image: &KeyImage) -> bool {
        self.key_images.contains(image)
    }
}

#[derive(Default)]
struct MempoolState {
    txs: Vec<Transaction>,
    ids: HashSet<TxId>,
    spends: HashMap<OutPoint, TxId>,
    images: HashMap<KeyImage, TxId>,
}

impl MempoolState {
    fn conflict(&self, tx: &Transaction) -> Option<RelayError> {
        for input in tx.inputs.iter() {
            match input {
                TxInput::Transparent { prevout } | TxInput::Hidden { prevout } => {
                    if self.spends.contains_key(prevout) {
                        return Some(RelayError::MempoolConflict(*prevout));
                    }
                }
                TxInput::Anonymous { key_image, .. } => {
                    if self.images.contains_key(key_image) {
                        return Some(RelayError::KeyImageSpent(key_image.to_string()));
                    }
                }
            }
        }
        None
    }

    fn insert(&mut self, tx: Transaction) {
        let txid = tx.txid();
        for input in tx.inputs.iter() {
            match input {
                TxInput::Transparent { prevout } | TxInput::Hidden { prevout } => {
                    self.spends.insert(*prevout, txid);
                }
                TxInput::Anonymous { key_image, .. } => {
                    self.images.insert(*key_image, txid);
                }
            }
        }
        self.ids.insert(txid);
        self.txs.push(tx);
    }

    fn fees(&self) -> Amount {
        self.txs.iter().map(|tx| tx.fee).sum()
    }
}

struct LedgerInner {
    chain: ChainState,
    mempool: MempoolState,
    blocks: Vec<Block>,
}

pub struct MemoryLedger {
    params: ChainParams,
    clock: Arc<dyn Clock>,
    prover: Arc<dyn RangeProver>,
    inner: Mutex<LedgerInner>,
    listeners: Mutex<Vec<Weak<dyn ChainListener>>>,
}

impl MemoryLedger {
    /// Starts a chain whose genesis block pays each `(key, value)` pair one
    /// transparent coin. Genesis time sits one mask step before the
    /// current search time, so the first block can be staked right away.
    pub fn new(
        params: ChainParams,
        clock: Arc<dyn Clock>,
        prover: Arc<dyn RangeProver>,
        funding: &[(PublicKey, Amount)],
    ) -> Self {
        let coinbase = Transaction {
            version: Transaction::VERSION,
            kind: TxKind::Coinbase,
            inputs: vec![],
            outputs: funding
                .iter()
                .map(|(address, value)| {
                    TxOutput::Transparent(PlainOutput {
                        address: *address,
                        value: *value,
                    })
                })
                .collect(),
            fee: 0,
            kernel: None,
            witness: vec![],
        };
        let transactions = vec![coinbase];
        let time = params
            .mask_time(clock.adjusted_time())
            .saturating_sub(params.stake_timestamp_mask + 1);
        let header = BlockHeader {
            height: 0,
            prev_hash: BlockHash::ZERO,
            time,
            tx_root: Block::compute_tx_root(&transactions),
        };
        let genesis = Block {
            header,
            transactions,
            signature: None,
        };

        let mut chain = ChainState {
            tip: ChainTip {
                height: 0,
                hash: genesis.hash(),
                time,
            },
            utxos: HashMap::new(),
            anon_outputs: vec![],
            anon_index: HashMap::new(),
            key_images: HashSet::new(),
        };
        for tx in genesis.transactions.iter() {
            chain.apply(tx, 0);
        }
        info!(
            "genesis {} with {} funded coins",
            genesis.hash(),
            funding.len()
        );

        Self {
            params,
            clock,
            prover,
            inner: Mutex::new(LedgerInner {
                chain,
                mempool: MempoolState::default(),
                blocks: vec![genesis],
            }),
            listeners: Mutex::new(vec![]),
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener and replays every connected block to it.
    pub fn subscribe(&self, listener: Arc<dyn ChainListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&listener));
        let blocks = self.lock().blocks.clone();
        for (height, block) in blocks.iter().enumerate() {
            listener.block_connected(block, height as u32);
        }
    }

    fn live_listeners(&self) -> Vec<Arc<dyn ChainListener>> {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| l.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn block(&self, height: u32) -> Option<Block> {
        self.lock().blocks.get(height as usize).cloned()
    }

    pub fn mempool_len(&self) -> usize {
        self.lock().mempool.txs.len()
    }

    pub fn mempool_contains(&self, txid: &TxId) -> bool {
        self.lock().mempool.ids.contains(txid)
    }

    pub fn is_key_image_spent(&self, image: &KeyImage) -> bool {
        self.lock().chain.key_images.contains(image)
    }

    /// Chain-only check, without touching the mempool.
    pub fn test_accept(&self, tx: &Transaction) -> Result<(), RelayError> {
        let inner = self.lock();
        check_transaction(tx, &inner.chain, self.prover.as_ref())
    }
}

impl ChainView for MemoryLedger {
    fn current_height(&self) -> u32 {
        self.lock().chain.tip.height
    }

    fn tip_hash(&self) -> BlockHash {
        self.lock().chain.tip.hash
    }

    fn tip_time(&self) -> u64 {
        self.lock().chain.tip.time
    }

    fn adjusted_time(&self) -> u64 {
        self.clock.adjusted_time()
    }

    fn tip(&self) -> ChainTip {
        self.lock().chain.tip
    }
}

impl OutputLookup for MemoryLedger {
    fn lookup_output(&self, outpoint: &OutPoint) -> Option<LedgerOutput> {
        self.lock().chain.lookup_output(outpoint)
    }
}

impl AnonSet for MemoryLedger {
    fn anon_count(&self) -> u64 {
        self.lock().chain.anon_count()
    }

    fn anon_member(&self, index: u64) -> Option<AnonMember> {
        self.lock().chain.anon_member(index)
    }

    fn anon_index_of(&self, outpoint: &OutPoint) -> Option<u64> {
        self.lock().chain.anon_index_of(outpoint)
    }
}

impl Mempool for MemoryLedger {
    fn submit(&self, tx: Transaction) -> Result<(), RelayError> {
        let txid = tx.txid();
        {
            let mut inner = self.lock();
            if inner.mempool.ids.contains(&txid) {
                return Err(RelayError::AlreadyKnown(txid));
            }
            if let Err(err) = check_transaction(&tx, &inner.chain, self.prover.as_ref()) {
                warn!("rejected {}: {}", txid, err);
                return Err(err);
            }
            if let Some(err) = inner.mempool.conflict(&tx) {
                warn!("rejected {}: {}", txid, err);
                return Err(err);
            }
            inner.mempool.insert(tx.clone());
            debug!("accepted {} into mempool", txid);
        }
        for listener in self.live_listeners() {
            listener.transaction_added_to_mempool(&tx);
        }
        Ok(())
    }
}

impl BlockTemplateSource for MemoryLedger {
    fn create_template(&self, coinbase_script: &[u8], include_witness: bool) -> BlockTemplate {
        let inner = self.lock();
        BlockTemplate {
            height: inner.chain.tip.height + 1,
            prev_hash: inner.chain.tip.hash,
            prev_time: inner.chain.tip.time,
            coinbase_script: coinbase_script.to_vec(),
            include_witness,
            transactions: inner.mempool.txs.clone(),
            fees: inner.mempool.fees(),
        }
    }
}

impl BlockSink for MemoryLedger {
    fn process_block(&self, block: Block) -> Result<BlockHash, StakeError> {
        let hash = block.hash();
        let height = {
            let mut inner = self.lock();
            let tip = inner.chain.tip;
            check_stake(&self.params, &block, &tip, &inner.chain)?;

            let mut staged = inner.chain.clone();
            for tx in block.transactions.iter() {
                check_transaction(tx, &staged, self.prover.as_ref())?;
                staged.apply(tx, block.header.height);
            }
            staged.tip = ChainTip {
                height: block.header.height,
                hash,
                time: block.header.time,
            };
            inner.chain = staged;
            inner.blocks.push(block.clone());

            let pending = std::mem::take(&mut inner.mempool);
            for tx in pending.txs.into_iter() {
                let txid = tx.txid();
                let included = block.transactions.iter().any(|b| b.txid() == txid);
                if included {
                    continue;
                }
                match check_transaction(&tx, &inner.chain, self.prover.as_ref()) {
                    Ok(()) if inner.mempool.conflict(&tx).is_none() => inner.mempool.insert(tx),
                    _ => debug!("evicted {} from mempool", txid),
                }
            }
            info!(
                "connected block {} at height {} with {} transactions",
                hash,
                block.header.height,
                block.transactions.len()
            );
            block.header.height
        };
        for listener in self.live_listeners() {
            listener.block_connected(&block, height);
        }
        Ok(hash)
    }
}
