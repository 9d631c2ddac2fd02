//! # ChainDb — Persistent Chain Storage
//!
//! The durability boundary of the node, built on sled's embedded key-value
//! store. Everything lives in the default keyspace under two prefixes:
//!
//! | Key                     | Value                          |
//! |-------------------------|--------------------------------|
//! | `HEADER-` ++ id (32B)   | JSON-encoded `ProcessedHeader` |
//! | `BLOCK-` ++ id (32B)    | raw block payload bytes        |
//!
//! Headers are stored as JSON so the on-disk record is the same object the
//! HTTP surface serves; block payloads are stored as the exact bytes the
//! merkle root commits to.
//!
//! ## Atomicity
//!
//! A chain-state change — the new header, its payload, and every
//! `ismainchain` flip of a fork swap — is staged into one [`sled::Batch`]
//! and applied in a single call. Once [`ChainDb::write`] returns, the
//! change is crash-consistent: either the whole reorganization landed or
//! none of it did.

use std::path::Path;

use crate::consensus::header::{Block, Hash, ProcessedHeader};
use crate::error::{StoreError, StoreResult};

const HEADER_PREFIX: &[u8] = b"HEADER-";
const BLOCK_PREFIX: &[u8] = b"BLOCK-";

/// Persistent header/block storage for the chain engine.
///
/// sled handles its own locking; `ChainDb` adds typed accessors and the
/// key layout. The chain engine serializes writers above this layer.
#[derive(Debug, Clone)]
pub struct ChainDb {
    db: sled::Db,
}

impl ChainDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Ok(ChainDb { db: sled::open(path)? })
    }

    /// Create a database that lives in memory and vanishes on drop.
    /// For tests — no filesystem side effects, no cleanup.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(ChainDb { db })
    }

    // -- Headers ------------------------------------------------------------

    /// Load the processed header stored under `id`, if any.
    pub fn header(&self, id: &Hash) -> StoreResult<Option<ProcessedHeader>> {
        match self.db.get(header_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether a header is stored under `id`.
    pub fn has_header(&self, id: &Hash) -> StoreResult<bool> {
        Ok(self.db.contains_key(header_key(id))?)
    }

    /// Iterate every stored processed header, in key order.
    pub fn headers(&self) -> impl Iterator<Item = StoreResult<ProcessedHeader>> + '_ {
        self.db.scan_prefix(HEADER_PREFIX).map(|entry| {
            let (_, value) = entry?;
            Ok(serde_json::from_slice(&value)?)
        })
    }

    /// Number of stored headers. A full prefix scan; fine at this scale.
    pub fn header_count(&self) -> usize {
        self.db.scan_prefix(HEADER_PREFIX).count()
    }

    // -- Blocks -------------------------------------------------------------

    /// Load the raw block payload stored under `id`, if any.
    pub fn block(&self, id: &Hash) -> StoreResult<Option<Block>> {
        Ok(self
            .db
            .get(block_key(id))?
            .map(|bytes| Block::new(bytes.to_vec())))
    }

    /// Iterate every stored block payload with its header id, in key order.
    pub fn blocks(&self) -> impl Iterator<Item = StoreResult<(Hash, Block)>> + '_ {
        self.db.scan_prefix(BLOCK_PREFIX).filter_map(|entry| {
            let (key, value) = match entry {
                Ok(kv) => kv,
                Err(e) => return Some(Err(StoreError::from(e))),
            };
            // Keys under this prefix are always prefix + 32 id bytes.
            let id: [u8; 32] = key.get(BLOCK_PREFIX.len()..)?.try_into().ok()?;
            Some(Ok((Hash(id), Block::new(value.to_vec()))))
        })
    }

    // -- Batched writes -----------------------------------------------------

    /// Stage a processed header into a batch.
    pub fn stage_header(batch: &mut sled::Batch, ph: &ProcessedHeader) -> StoreResult<()> {
        let bytes = serde_json::to_vec(ph)?;
        batch.insert(&header_key(&ph.id())[..], bytes);
        Ok(())
    }

    /// Stage a raw block payload into a batch.
    pub fn stage_block(batch: &mut sled::Batch, id: &Hash, block: &Block) {
        batch.insert(&block_key(id)[..], block.as_bytes());
    }

    /// Apply a staged batch atomically and flush it to disk.
    pub fn write(&self, batch: sled::Batch) -> StoreResult<()> {
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}

fn header_key(id: &Hash) -> [u8; 39] {
    let mut key = [0u8; 39];
    key[..7].copy_from_slice(HEADER_PREFIX);
    key[7..].copy_from_slice(&id.0);
    key
}

fn block_key(id: &Hash) -> [u8; 38] {
    let mut key = [0u8; 38];
    key[..6].copy_from_slice(BLOCK_PREFIX);
    key[6..].copy_from_slice(&id.0);
    key
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::header::Header;

    // Store-level tests don't need valid proofs of work, just distinct ids.
    fn make_processed(height: u64, stamp: u8) -> ProcessedHeader {
        ProcessedHeader {
            header: Header {
                parent_id: Hash([stamp; 32]),
                merkle_root: Block::from("payload").merkle_root(),
                difficulty: 16,
                timestamp: 1_700_000_000_000_000_000 + height as i64,
                nonces: [0, 1, 2],
                version: 0,
            },
            block_height: height,
            is_main_chain: false,
            ever_main_chain: false,
            total_difficulty: 16 * (height + 1),
        }
    }

    fn put(db: &ChainDb, ph: &ProcessedHeader, payload: &str) {
        let mut batch = sled::Batch::default();
        ChainDb::stage_header(&mut batch, ph).unwrap();
        ChainDb::stage_block(&mut batch, &ph.id(), &Block::from(payload));
        db.write(batch).unwrap();
    }

    #[test]
    fn temporary_database_starts_empty() {
        let db = ChainDb::open_temporary().unwrap();
        assert_eq!(db.header_count(), 0);
        assert_eq!(db.blocks().count(), 0);
    }

    #[test]
    fn header_roundtrip() {
        let db = ChainDb::open_temporary().unwrap();
        let ph = make_processed(3, 1);
        put(&db, &ph, "payload");

        let loaded = db.header(&ph.id()).unwrap().expect("header should exist");
        assert_eq!(loaded, ph);
        assert!(db.has_header(&ph.id()).unwrap());
    }

    #[test]
    fn block_roundtrip_preserves_raw_bytes() {
        let db = ChainDb::open_temporary().unwrap();
        let ph = make_processed(0, 2);
        put(&db, &ph, "team rocket");

        let block = db.block(&ph.id()).unwrap().expect("block should exist");
        assert_eq!(block.as_bytes(), b"team rocket");
    }

    #[test]
    fn missing_keys_read_as_none() {
        let db = ChainDb::open_temporary().unwrap();
        let id = Hash([0xAB; 32]);
        assert!(db.header(&id).unwrap().is_none());
        assert!(db.block(&id).unwrap().is_none());
        assert!(!db.has_header(&id).unwrap());
    }

    #[test]
    fn batch_lands_header_and_block_together() {
        let db = ChainDb::open_temporary().unwrap();
        let a = make_processed(0, 3);
        let b = make_processed(1, 4);

        // Two headers and two payloads in one batch.
        let mut batch = sled::Batch::default();
        ChainDb::stage_header(&mut batch, &a).unwrap();
        ChainDb::stage_block(&mut batch, &a.id(), &Block::from("alpha"));
        ChainDb::stage_header(&mut batch, &b).unwrap();
        ChainDb::stage_block(&mut batch, &b.id(), &Block::from("beta"));
        db.write(batch).unwrap();

        assert_eq!(db.header_count(), 2);
        assert_eq!(db.block(&a.id()).unwrap().unwrap().as_bytes(), b"alpha");
        assert_eq!(db.block(&b.id()).unwrap().unwrap().as_bytes(), b"beta");
    }

    #[test]
    fn restaging_a_header_overwrites_in_place() {
        let db = ChainDb::open_temporary().unwrap();
        let mut ph = make_processed(5, 5);
        put(&db, &ph, "payload");

        // Flip the main-chain flag and re-stage under the same id, the way
        // a fork swap does.
        ph.is_main_chain = true;
        ph.ever_main_chain = true;
        let mut batch = sled::Batch::default();
        ChainDb::stage_header(&mut batch, &ph).unwrap();
        db.write(batch).unwrap();

        assert_eq!(db.header_count(), 1);
        let loaded = db.header(&ph.id()).unwrap().unwrap();
        assert!(loaded.is_main_chain);
        assert!(loaded.ever_main_chain);
    }

    #[test]
    fn prefix_scans_stay_in_their_lane() {
        let db = ChainDb::open_temporary().unwrap();
        for i in 0..4 {
            put(&db, &make_processed(i, 10 + i as u8), "payload");
        }

        assert_eq!(db.headers().count(), 4);
        assert_eq!(db.blocks().count(), 4);
        for entry in db.headers() {
            entry.unwrap();
        }
        for entry in db.blocks() {
            let (_, block) = entry.unwrap();
            assert_eq!(block.as_bytes(), b"payload");
        }
    }

    #[test]
    fn reopening_a_persistent_database_keeps_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ph = make_processed(2, 6);

        {
            let db = ChainDb::open(dir.path()).unwrap();
            put(&db, &ph, "durable");
        }

        let db = ChainDb::open(dir.path()).unwrap();
        let loaded = db.header(&ph.id()).unwrap().expect("survives reopen");
        assert_eq!(loaded, ph);
        assert_eq!(db.block(&ph.id()).unwrap().unwrap().as_bytes(), b"durable");
    }

    #[test]
    fn corrupt_header_record_surfaces_as_error() {
        let db = ChainDb::open_temporary().unwrap();
        let id = Hash([7; 32]);
        db.db.insert(&header_key(&id)[..], b"not json".as_slice()).unwrap();

        assert!(matches!(db.header(&id), Err(StoreError::Corrupt(_))));
    }
}
