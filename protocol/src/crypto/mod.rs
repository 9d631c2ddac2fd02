//! Cryptographic primitives. There is exactly one: SHA-256.

pub mod hash;

pub use hash::sha256;
