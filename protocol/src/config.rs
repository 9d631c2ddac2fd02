//! # Consensus Constants
//!
//! Every magic number in tricoin lives here. These values are consensus
//! parameters: changing any of them after genesis is a hard fork, so they
//! are chosen once and written down loudly.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Proof of Work
// ---------------------------------------------------------------------------

/// The floor on block difficulty, and the difficulty the genesis block is
/// mined at. `difficulty = d` demands a three-way collision in the low `d`
/// bits of per-nonce SHA-256 digests, so expected mining work grows as
/// roughly `2^(2d/3)` — 16 keeps genesis (and test mining) instant while
/// still being a real search.
pub const MINIMUM_DIFFICULTY: u64 = 16;

/// Payload the node mines the genesis block over at first start.
/// Every chain gets a birth certificate; ours is also good advice.
pub const GENESIS_PAYLOAD: &[u8] = b"Never roll your own crypto";

/// The only header version this network understands. The field exists so a
/// future commitment scheme can be introduced without redefining the header
/// layout; until then anything non-zero is rejected.
pub const HEADER_VERSION: u8 = 0;

// ---------------------------------------------------------------------------
// Block Limits
// ---------------------------------------------------------------------------

/// Maximum block payload size in bytes. A payload is a team name, not a
/// novel; 1000 bytes is already generous.
pub const MAX_BLOCK_SIZE: usize = 1000;

/// How far a submitted header's timestamp may drift from the node's clock,
/// in either direction. Timestamps are miner-supplied and this bound is the
/// only defense against them.
pub const MAX_CLOCK_DRIFT: Duration = Duration::from_secs(2 * 60);

/// Clock-drift bound in nanoseconds, the unit header timestamps carry.
pub const MAX_CLOCK_DRIFT_NANOS: i64 = MAX_CLOCK_DRIFT.as_nanos() as i64;

// ---------------------------------------------------------------------------
// Difficulty Retargeting
// ---------------------------------------------------------------------------

/// Target inter-block time the retargeting controller steers toward.
pub const TARGET_BLOCK_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Target inter-block time in nanoseconds.
pub const TARGET_BLOCK_INTERVAL_NANOS: i64 = TARGET_BLOCK_INTERVAL.as_nanos() as i64;

/// Wall-clock length of one retargeting window.
pub const RETARGET_LENGTH: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of blocks in one retargeting window: 144 at a 10-minute target.
/// Difficulty is constant within a window and reconsidered when it closes.
pub const RETARGET_WINDOW: u64 =
    (RETARGET_LENGTH.as_secs() / TARGET_BLOCK_INTERVAL.as_secs()) as u64;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP listen address for the node binary.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default on-disk location of the chain database.
pub const DEFAULT_DB_PATH: &str = "blockchain.db";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retarget_window_is_144_blocks() {
        assert_eq!(RETARGET_WINDOW, 144);
    }

    #[test]
    fn clock_drift_constants_agree() {
        assert_eq!(MAX_CLOCK_DRIFT_NANOS, 120_000_000_000);
        assert_eq!(MAX_CLOCK_DRIFT.as_nanos() as i64, MAX_CLOCK_DRIFT_NANOS);
    }

    #[test]
    fn block_interval_constants_agree() {
        assert_eq!(TARGET_BLOCK_INTERVAL_NANOS, 600_000_000_000);
    }

    #[test]
    fn minimum_difficulty_is_positive() {
        // A zero floor would make the empty collision vacuously valid.
        assert!(MINIMUM_DIFFICULTY > 0);
    }

    #[test]
    fn genesis_payload_fits_block_limit() {
        assert!(GENESIS_PAYLOAD.len() <= MAX_BLOCK_SIZE);
    }
}
