//! # Hashing Utilities
//!
//! SHA-256, and only SHA-256. Header identities, the merkle commitment, and
//! the proof-of-work puzzle all speak the same hash; a second primitive
//! would just be a second thing to get wrong.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `data` as a fixed-size array.
///
/// The fixed-size return type propagates naturally into [`crate::consensus::Hash`]
/// and keeps hot paths allocation-free.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string — the one vector everyone memorizes.
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_deterministic() {
        assert_eq!(sha256(b"tricoin"), sha256(b"tricoin"));
        assert_ne!(sha256(b"tricoin"), sha256(b"Tricoin"));
    }
}
