use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

pub type Amount = u64;

pub const COIN: Amount = 100_000_000;

/// Privacy level of an output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// amount and destination are public
    Transparent,
    /// amount committed, one-time destination key visible
    Hidden,
    /// amount committed, spent through a ring of decoys
    Anonymous,
}

impl OutputType {
    pub const ALL: [OutputType; 3] = [
        OutputType::Transparent,
        OutputType::Hidden,
        OutputType::Anonymous,
    ];

    pub fn is_committed(&self) -> bool {
        !matches!(self, OutputType::Transparent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Transparent => "plain",
            OutputType::Hidden => "blind",
            OutputType::Anonymous => "anon",
        }
    }

    pub(crate) fn slot(&self) -> usize {
        match self {
            OutputType::Transparent => 0,
            OutputType::Hidden => 1,
            OutputType::Anonymous => 2,
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" | "transparent" | "standard" => Ok(OutputType::Transparent),
            "blind" | "hidden" | "ct" => Ok(OutputType::Hidden),
            "anon" | "anonymous" | "ringct" => Ok(OutputType::Anonymous),
            other => Err(format!("unknown output type: {other:?}")),
        }
    }
}

/// Hex (de)serialization for fixed 32 byte values.
pub mod hex32 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("expected 32 bytes"))
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(#[serde(with = "hex32")] pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Leading eight bytes read as a little endian integer.
    pub fn low_u64(&self) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(word)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..16])
    }
}

pub type TxId = Hash256;
pub type BlockHash = Hash256;

/// Identifier of one output: creating transaction and position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}
