//! # The Triple-Collision Puzzle
//!
//! Tricoin's proof of work is not "hash below a target". A header commits to
//! three nonces; each nonce is hashed into its own SHA-256 digest over the
//! per-nonce preimage (the header with only that nonce in the nonce region),
//! and the header is valid when all three digests agree in their low
//! `difficulty` bits.
//!
//! Equivalently: read each digest as a big-endian integer, reduce modulo
//! `2^difficulty`, and demand a three-way collision. Expected search cost is
//! on the order of `2^(2d/3)` hashes — the generalized birthday bound for a
//! triple — which is what makes `difficulty` an additive work parameter.
//!
//! Verification is three hashes; mining is a residue-bucketing search.

use std::collections::HashMap;

use crate::consensus::header::Header;
use crate::crypto::sha256;

/// The nonce space ran out before a witness appeared. At any difficulty a
/// u64 counter can realistically cover, this does not happen.
#[derive(Debug, thiserror::Error)]
#[error("exhausted the nonce space without finding a witness")]
pub struct NonceSpaceExhausted;

/// Check a header's puzzle witness.
///
/// Pure function of the header bytes; no clock, no chain context.
pub fn verify(header: &Header) -> bool {
    let d = header.difficulty;
    let r0 = residue(&sha256(&header.pow_preimage(0)), d);
    let r1 = residue(&sha256(&header.pow_preimage(1)), d);
    let r2 = residue(&sha256(&header.pow_preimage(2)), d);
    r0 == r1 && r1 == r2
}

/// Search for a witness and write it into `header.nonces`.
///
/// Iterates nonces from zero, bucketing by residue; the third member of any
/// bucket completes the witness. Memory grows with the search, so this is
/// only sensible at the small difficulties it is used for — the in-process
/// genesis block and tests.
pub fn mine(header: &mut Header) -> Result<(), NonceSpaceExhausted> {
    let mut buckets: HashMap<Vec<u8>, Vec<u64>> = HashMap::new();
    let mut probe = *header;

    for nonce in 0..u64::MAX {
        probe.nonces[0] = nonce;
        let r = residue(&sha256(&probe.pow_preimage(0)), probe.difficulty);
        let bucket = buckets.entry(r).or_default();
        bucket.push(nonce);
        if bucket.len() == 3 {
            header.nonces = [bucket[0], bucket[1], bucket[2]];
            return Ok(());
        }
    }

    Err(NonceSpaceExhausted)
}

/// The low `difficulty` bits of a digest, as masked big-endian tail bytes.
/// Difficulties of 256 and above mean the whole digest.
fn residue(digest: &[u8; 32], difficulty: u64) -> Vec<u8> {
    if difficulty >= 256 {
        return digest.to_vec();
    }
    let bits = difficulty as usize;
    let nbytes = bits.div_ceil(8);
    let mut tail = digest[32 - nbytes..].to_vec();
    if bits % 8 != 0 {
        tail[0] &= (1u8 << (bits % 8)) - 1;
    }
    tail
}
