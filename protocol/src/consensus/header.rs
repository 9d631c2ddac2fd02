//! # Headers, Blocks, and Hashes
//!
//! The consensus data model. A [`Block`] is an opaque payload (at most 1000
//! bytes — in practice, a team name). A [`Header`] is everything consensus
//! cares about: the parent link, the merkle commitment to the payload, the
//! claimed difficulty, a miner-supplied timestamp, the three-nonce puzzle
//! witness, and a version byte.
//!
//! ## Canonical Serialization
//!
//! A header's identity is the SHA-256 of its canonical 105-byte big-endian
//! encoding:
//!
//! ```text
//! parentid (32) || root (32) || difficulty (8) || timestamp (8)
//!               || nonces[0..3] (24) || version (1)
//! ```
//!
//! The per-nonce proof-of-work preimage is the same layout with a single
//! nonce slot (89 bytes). Both layouts are frozen; changing either is a
//! hard fork.
//!
//! ## Wire Form
//!
//! JSON field names are stable wire identifiers (`parentid`, `root`, ...),
//! hashes are 64-char lowercase hex, and block payloads travel as strings.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::{HEADER_VERSION, MAX_BLOCK_SIZE};
use crate::consensus::pow;
use crate::crypto::sha256;
use crate::error::AddBlockError;

/// Canonical header encoding length in bytes.
pub const HEADER_LEN: usize = 105;

/// Per-nonce proof-of-work preimage length in bytes.
pub const POW_PREIMAGE_LEN: usize = 89;

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// A 32-byte SHA-256 digest with a canonical lowercase-hex string form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash. Reserved: it names no header and appears only as
    /// the genesis parent and in unfilled templates.
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-char lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashParseError::Length(bytes.len()))?;
        Ok(Hash(arr))
    }
}

/// Why a hex string failed to parse as a [`Hash`].
#[derive(Debug, thiserror::Error)]
pub enum HashParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// An opaque block payload.
///
/// Consensus never interprets the bytes — the merkle commitment is over the
/// raw payload exactly as received. The scoreboard and the wire form both
/// read it as UTF-8 (lossily), because by convention it is a producer name.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Block(Vec<u8>);

impl Block {
    pub fn new(bytes: Vec<u8>) -> Self {
        Block(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The version-0 merkle commitment: a single-leaf tree, i.e. the
    /// SHA-256 of the payload itself.
    pub fn merkle_root(&self) -> Hash {
        Hash(sha256(&self.0))
    }

    /// The payload read as a producer name.
    pub fn producer(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for Block {
    fn from(s: &str) -> Self {
        Block(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Block {
    fn from(b: &[u8]) -> Self {
        Block(b.to_vec())
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Block(s.into_bytes()))
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The consensus-critical commitment a miner submits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Identity of the parent header. The zero hash is reserved; a parent
    /// lookup must succeed for everything but genesis.
    #[serde(rename = "parentid")]
    pub parent_id: Hash,

    /// SHA-256 of the raw block payload (single-leaf commitment, v0).
    #[serde(rename = "root")]
    pub merkle_root: Hash,

    /// Required-work parameter: the number of low digest bits the three
    /// nonces must collide in.
    pub difficulty: u64,

    /// Nanoseconds since the Unix epoch, miner-supplied.
    pub timestamp: i64,

    /// The three-element puzzle witness.
    pub nonces: [u64; 3],

    /// Header version; 0 is the only live value.
    pub version: u8,
}

impl Header {
    /// The canonical 105-byte big-endian encoding hashed by [`Header::id`].
    pub fn serialized(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..32].copy_from_slice(&self.parent_id.0);
        buf[32..64].copy_from_slice(&self.merkle_root.0);
        buf[64..72].copy_from_slice(&self.difficulty.to_be_bytes());
        buf[72..80].copy_from_slice(&self.timestamp.to_be_bytes());
        for (i, nonce) in self.nonces.iter().enumerate() {
            buf[80 + 8 * i..88 + 8 * i].copy_from_slice(&nonce.to_be_bytes());
        }
        buf[104] = self.version;
        buf
    }

    /// The header's identity: SHA-256 of the canonical encoding.
    pub fn id(&self) -> Hash {
        Hash(sha256(&self.serialized()))
    }

    /// The per-nonce puzzle preimage: the canonical layout with only
    /// `nonces[slot]` occupying the nonce region.
    pub(crate) fn pow_preimage(&self, slot: usize) -> [u8; POW_PREIMAGE_LEN] {
        let mut buf = [0u8; POW_PREIMAGE_LEN];
        buf[..32].copy_from_slice(&self.parent_id.0);
        buf[32..64].copy_from_slice(&self.merkle_root.0);
        buf[64..72].copy_from_slice(&self.difficulty.to_be_bytes());
        buf[72..80].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[80..88].copy_from_slice(&self.nonces[slot].to_be_bytes());
        buf[88] = self.version;
        buf
    }

    /// Structural validation of a submission: payload size, proof of work,
    /// version, and the merkle commitment — in that order.
    pub fn validate(&self, block: &Block) -> Result<(), AddBlockError> {
        if block.len() > MAX_BLOCK_SIZE {
            return Err(AddBlockError::BlockSize(block.len()));
        }
        if !pow::verify(self) {
            return Err(AddBlockError::InvalidPoW);
        }
        if self.version != HEADER_VERSION {
            return Err(AddBlockError::UnknownVersion(self.version));
        }
        if self.merkle_root != block.merkle_root() {
            return Err(AddBlockError::MerkleMismatch);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProcessedHeader
// ---------------------------------------------------------------------------

/// A header plus the chain metadata the node derives when accepting it.
///
/// This is the record persisted under `HEADER-<id>`: created once at
/// submission, mutated afterwards only in `is_main_chain` (freely) and
/// `ever_main_chain` (once, false to true).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedHeader {
    pub header: Header,

    /// 0 for genesis, `parent.block_height + 1` otherwise.
    #[serde(rename = "blockheight")]
    pub block_height: u64,

    /// On the currently selected fork.
    #[serde(rename = "ismainchain")]
    pub is_main_chain: bool,

    /// Was on the selected fork at some point in history. Monotone.
    #[serde(rename = "evermainchain")]
    pub ever_main_chain: bool,

    /// Sum of `difficulty` along the chain ending here, inclusive.
    #[serde(rename = "totaldiff")]
    pub total_difficulty: u64,
}

impl ProcessedHeader {
    pub fn id(&self) -> Hash {
        self.header.id()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
