//! # Error Types
//!
//! Two error families: [`AddBlockError`] is the rejection vocabulary miners
//! see when a submission fails, and [`StoreError`] is what the persistence
//! layer reports. A store failure while processing a submission surfaces as
//! `AddBlockError::Store` — the one kind the submitter did not cause.

use crate::consensus::header::Hash;

/// Errors from the persistence layer and its invariants.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt header record: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// A stored header's parent is missing from the store. Every accepted
    /// header is written after its parent, so this means on-disk corruption.
    #[error("broken parent link at {0}")]
    BrokenChain(Hash),

    /// The height index has no entry for a height at or below the head.
    #[error("no main-chain header at height {0}")]
    MissingHeight(u64),

    /// The store holds headers but none is flagged main-chain.
    #[error("store contains no main-chain headers")]
    EmptyChain,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a block submission was rejected (or, in the `Store` case, lost).
#[derive(Debug, thiserror::Error)]
pub enum AddBlockError {
    #[error("block is too large: {0} bytes")]
    BlockSize(usize),

    #[error("unknown header version {0}")]
    UnknownVersion(u8),

    #[error("invalid proof of work")]
    InvalidPoW,

    #[error("merkle root does not commit the block payload")]
    MerkleMismatch,

    #[error("difficulty {submitted} below required {required}")]
    Difficulty { submitted: u64, required: u64 },

    #[error("header timestamp drifts more than two minutes from node clock")]
    ClockDrift,

    #[error("header already seen: {0}")]
    SpamHeader(Hash),

    #[error("parent header not found: {0}")]
    ParentNotFound(Hash),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl AddBlockError {
    /// True when the submitter is at fault (an HTTP 400), false when the
    /// node is (`Store`, an HTTP 500).
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AddBlockError::Store(_))
    }
}

/// Errors that keep the node from starting. All of them are fatal: a node
/// that cannot open its store or establish genesis has nothing to serve.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("mining genesis block: {0}")]
    Mining(#[from] crate::consensus::pow::NonceSpaceExhausted),
}
