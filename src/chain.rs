//! Narrow interfaces between the wallet engine and the node around it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::crypto::commitment::Commitment;
use crate::crypto::PublicKey;
use crate::error::{RelayError, StakeError};
use crate::tx::{Block, BlockTemplate, Transaction, TxKind, TxOutput};
use crate::types::{BlockHash, OutPoint};

/// Height, hash and time of the current best block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u32,
    pub hash: BlockHash,
    pub time: u64,
}

pub trait ChainView: Send + Sync {
    fn current_height(&self) -> u32;

    fn tip_hash(&self) -> BlockHash;

    fn tip_time(&self) -> u64;

    fn adjusted_time(&self) -> u64;

    fn tip(&self) -> ChainTip {
        ChainTip {
            height: self.current_height(),
            hash: self.tip_hash(),
            time: self.tip_time(),
        }
    }
}

/// An unspent output as recorded on chain.
#[derive(Clone, Debug)]
pub struct LedgerOutput {
    pub output: TxOutput,
    pub height: u32,
    pub kind: TxKind,
}

pub trait OutputLookup {
    /// Confirmed and unspent outputs only.
    fn lookup_output(&self, outpoint: &OutPoint) -> Option<LedgerOutput>;
}

/// Public part of an anonymous output, as used in rings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnonMember {
    pub one_time_key: PublicKey,
    pub commitment: Commitment,
}

/// Confirmed anonymous outputs, indexed in confirmation order.
pub trait AnonSet {
    fn anon_count(&self) -> u64;

    fn anon_member(&self, index: u64) -> Option<AnonMember>;

    fn anon_index_of(&self, outpoint: &OutPoint) -> Option<u64>;
}

pub trait Mempool: Send + Sync {
    fn submit(&self, tx: Transaction) -> Result<(), RelayError>;
}

pub trait BlockTemplateSource: Send + Sync {
    fn create_template(&self, coinbase_script: &[u8], include_witness: bool) -> BlockTemplate;
}

pub trait BlockSink: Send + Sync {
    fn process_block(&self, block: Block) -> Result<BlockHash, StakeError>;
}

/// Everything a wallet needs from its node.
pub trait Chain:
    ChainView + OutputLookup + AnonSet + Mempool + BlockTemplateSource + BlockSink
{
}

impl<T> Chain for T where
    T: ChainView + OutputLookup + AnonSet + Mempool + BlockTemplateSource + BlockSink
{
}

/// Notifications a node pushes to registered wallets.
pub trait ChainListener: Send + Sync {
    fn transaction_added_to_mempool(&self, tx: &Transaction);

    fn block_connected(&self, block: &Block, height: u32);
}

pub trait Clock: Send + Sync {
    /// Network-adjusted time in seconds.
    fn adjusted_time(&self) -> u64;

    fn sleep(&self, duration: Duration);
}

#[derive(Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn adjusted_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when told to. Sleeping advances it instead of
/// blocking the thread.
pub struct ManualClock {
    now_ms: AtomicU64,
    sleeps: AtomicUsize,
}

impl ManualClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_secs.saturating_mul(1000)),
            sleeps: AtomicUsize::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_time(&self, secs: u64) {
        self.now_ms.store(secs.saturating_mul(1000), Ordering::SeqCst);
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn adjusted_time(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst) / 1000
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::{Clock, ManualClock};
    use std::time::Duration;

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.adjusted_time(), 1_000);
        for _ in 0..3 {
            clock.sleep(Duration::from_millis(250));
        }
        assert_eq!(clock.adjusted_time(), 1_000);
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.adjusted_time(), 1_001);
        assert_eq!(clock.sleep_count(), 4);

        clock.set_time(5_000);
        assert_eq!(clock.adjusted_time(), 5_000);
    }
}
