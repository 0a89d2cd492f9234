use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::commitment::{BlindingFactor, Commitment};
use crate::crypto::range_proof::RangeProof;
use crate::crypto::signature::{KeyImage, RingSignature, Signature};
use crate::crypto::stealth::StealthPayload;
use crate::crypto::PublicKey;
use crate::types::{Amount, BlockHash, Hash256, OutPoint, OutputType, TxId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Standard,
    /// creates coins without inputs, only valid in the genesis block
    Coinbase,
    /// spends one staked coin and collects the block reward
    Coinstake,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxInput {
    Transparent {
        prevout: OutPoint,
    },
    Hidden {
        prevout: OutPoint,
    },
    Anonymous {
        /// global anon-set indices, real member hidden among them
        ring: Vec<u64>,
        key_image: KeyImage,
        /// recommitment of the real member's value under a fresh blinding
        pseudo_commitment: Commitment,
    },
}

impl TxInput {
    pub fn output_type(&self) -> OutputType {
        match self {
            TxInput::Transparent { .. } => OutputType::Transparent,
            TxInput::Hidden { .. } => OutputType::Hidden,
            TxInput::Anonymous { .. } => OutputType::Anonymous,
        }
    }

    pub fn prevout(&self) -> Option<&OutPoint> {
        match self {
            TxInput::Transparent { prevout } | TxInput::Hidden { prevout } => Some(prevout),
            TxInput::Anonymous { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainOutput {
    pub address: PublicKey,
    pub value: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindOutput {
    pub one_time_key: PublicKey,
    pub commitment: Commitment,
    pub stealth: StealthPayload,
    pub range_proof: RangeProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutput {
    Transparent(PlainOutput),
    Hidden(BlindOutput),
    Anonymous(BlindOutput),
}

impl TxOutput {
    pub fn output_type(&self) -> OutputType {
        match self {
            TxOutput::Transparent(_) => OutputType::Transparent,
            TxOutput::Hidden(_) => OutputType::Hidden,
            TxOutput::Anonymous(_) => OutputType::Anonymous,
        }
    }

    /// Value commitment; transparent values are committed with zero blinding.
    pub fn commitment(&self) -> Commitment {
        match self {
            TxOutput::Transparent(plain) => Commitment::transparent(plain.value),
            TxOutput::Hidden(blind) | TxOutput::Anonymous(blind) => blind.commitment,
        }
    }

    pub fn plain_value(&self) -> Option<Amount> {
        match self {
            TxOutput::Transparent(plain) => Some(plain.value),
            _ => None,
        }
    }

    pub fn blind(&self) -> Option<&BlindOutput> {
        match self {
            TxOutput::Transparent(_) => None,
            TxOutput::Hidden(blind) | TxOutput::Anonymous(blind) => Some(blind),
        }
    }

    /// Key whose secret spends the output.
    pub fn owner_key(&self) -> &PublicKey {
        match self {
            TxOutput::Transparent(plain) => &plain.address,
            TxOutput::Hidden(blind) | TxOutput::Anonymous(blind) => &blind.one_time_key,
        }
    }
}

/// Public excess `(Σ r_out - Σ r_in)·G` with a signature proving its
/// discrete log is known, i.e. no value was created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceKernel {
    pub excess: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputWitness {
    Key(Signature),
    Ring(RingSignature),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub kind: TxKind,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: Amount,
    pub kernel: Option<BalanceKernel>,
    /// one entry per input, same order
    pub witness: Vec<InputWitness>,
}

impl Transaction {
    pub const VERSION: u32 = 1;

    /// Hash of everything except signatures; the transaction id and the
    /// message every witness signs.
    pub fn txid(&self) -> TxId {
        self.txid_with_excess(self.kernel.as_ref().map(|kernel| &kernel.excess))
    }

    /// Id the transaction gets once a kernel with `excess` is attached.
    pub fn txid_with_excess(&self, excess: Option<&PublicKey>) -> TxId {
        let mut hasher = Sha256::new();
        hasher.update(b"ringstake/tx");
        hasher.update(self.version.to_le_bytes());
        hasher.update([match self.kind {
            TxKind::Standard => 0u8,
            TxKind::Coinbase => 1,
            TxKind::Coinstake => 2,
        }]);
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in self.inputs.iter() {
            hash_input(&mut hasher, input);
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in self.outputs.iter() {
            hash_output(&mut hasher, output);
        }
        hasher.update(self.fee.to_le_bytes());
        match excess {
            Some(excess) => hasher.update(excess.as_bytes()),
            None => hasher.update([0u8; 32]),
        }
        Hash256(hasher.finalize().into())
    }

    pub fn is_coinstake(&self) -> bool {
        self.kind == TxKind::Coinstake
    }

    pub fn has_committed_parts(&self) -> bool {
        self.inputs.iter().any(|i| i.output_type().is_committed())
            || self.outputs.iter().any(|o| o.output_type().is_committed())
    }

    pub fn outpoint(&self, index: u32) -> OutPoint {
        OutPoint::new(self.txid(), index)
    }
}

fn hash_input(hasher: &mut Sha256, input: &TxInput) {
    match input {
        TxInput::Transparent { prevout } | TxInput::Hidden { prevout } => {
            hasher.update([input.output_type().slot() as u8]);
            hasher.update(prevout.txid.as_bytes());
            hasher.update(prevout.index.to_le_bytes());
        }
        TxInput::Anonymous {
            ring,
            key_image,
            pseudo_commitment,
        } => {
            hasher.update([OutputType::Anonymous.slot() as u8]);
            hasher.update((ring.len() as u64).to_le_bytes());
            for member in ring.iter() {
                hasher.update(member.to_le_bytes());
            }
            hasher.update(key_image.0);
            hasher.update(pseudo_commitment.as_bytes());
        }
    }
}

fn hash_output(hasher: &mut Sha256, output: &TxOutput) {
    hasher.update([output.output_type().slot() as u8]);
    match output {
        TxOutput::Transparent(plain) => {
            hasher.update(plain.address.as_bytes());
            hasher.update(plain.value.to_le_bytes());
        }
        TxOutput::Hidden(blind) | TxOutput::Anonymous(blind) => {
            hasher.update(blind.one_time_key.as_bytes());
            hasher.update(blind.commitment.as_bytes());
            hasher.update(blind.stealth.ephemeral.as_bytes());
            hasher.update(blind.stealth.masked_value.to_le_bytes());
            hasher.update(&blind.range_proof.0);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub height: u32,
    pub block_hash: BlockHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    pub output_type: OutputType,
    pub prevout: Option<OutPoint>,
    pub value: Amount,
    /// anon inputs: ring members and position of the real one
    pub ring: Vec<u64>,
    pub real_index: Option<usize>,
    pub blinding: Option<BlindingFactor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub index: u32,
    pub output_type: OutputType,
    pub value: Amount,
    pub blinding: Option<BlindingFactor>,
    pub owned: bool,
    pub change: bool,
}

/// Wallet-private bookkeeping kept next to a transaction. Never relayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: TxId,
    pub inputs: Vec<InputRecord>,
    pub outputs: Vec<OutputRecord>,
    pub fee: Amount,
    pub from_me: bool,
    pub confirmation: Option<Confirmation>,
}

impl TransactionRecord {
    pub fn input_value(&self) -> Amount {
        self.inputs.iter().map(|i| i.value).sum()
    }

    pub fn output_value(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn owned_output_value(&self) -> Amount {
        self.outputs
            .iter()
            .filter(|o| o.owned)
            .map(|o| o.value)
            .sum()
    }

    pub fn change_outputs(&self) -> impl Iterator<Item = &OutputRecord> {
        self.outputs.iter().filter(|o| o.change)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u32,
    pub prev_hash: BlockHash,
    pub time: u64,
    pub tx_root: Hash256,
}

impl BlockHeader {
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Sha256::new();
        hasher.update(b"ringstake/block");
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(self.time.to_le_bytes());
        hasher.update(self.tx_root.as_bytes());
        Hash256(hasher.finalize().into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// first transaction is the coinstake in staked blocks
    pub transactions: Vec<Transaction>,
    pub signature: Option<Signature>,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn coinstake(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinstake())
    }

    pub fn compute_tx_root(transactions: &[Transaction]) -> Hash256 {
        let mut hasher = Sha256::new();
        for tx in transactions.iter() {
            hasher.update(tx.txid().as_bytes());
        }
        Hash256(hasher.finalize().into())
    }
}

/// Unsigned block contents handed to the assembler each cycle.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub height: u32,
    pub prev_hash: BlockHash,
    pub prev_time: u64,
    pub coinbase_script: Vec<u8>,
    pub include_witness: bool,
    pub transactions: Vec<Transaction>,
    pub fees: Amount,
}
