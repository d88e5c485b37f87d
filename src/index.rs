//! Secondary KV index: block#→location, blockHash→block#, txId→location,
//! and the scalar last-indexed-block-number.
//!
//! Backed by `sled`, an embedded ordered byte-keyed store, standing in for
//! the "embedded key-value store" external collaborator in spec.md §1.
//! Keys are a short prefix concatenated with the natural key, matching
//! spec.md §4.4's "conceptually prefixed per map" keyspace.

use crate::checkpoint::{CheckpointInfo, CHECKPOINT_KEY};
use crate::error::Result;
use crate::types::{BlockNum, FileLocPointer, SegmentNum};

const BLOCK_NUM_PREFIX: u8 = b'h';
const BLOCK_HASH_PREFIX: u8 = b'n';
const TX_ID_PREFIX: u8 = b't';
const LAST_INDEXED_KEY: &[u8] = b"lastIndexed";

/// One block's worth of index entries to be written atomically.
pub struct BlockIndexInfo<'a> {
    pub block_num: BlockNum,
    pub block_hash: &'a [u8],
    pub block_loc: FileLocPointer,
    /// `(tx_id, location)` pairs, absolute within the segment.
    pub tx_locs: Vec<(&'a [u8], FileLocPointer)>,
}

pub struct Index {
    db: sled::Db,
}

fn block_num_key(n: BlockNum) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = BLOCK_NUM_PREFIX;
    key[1..].copy_from_slice(&n.to_be_bytes());
    key
}

fn block_hash_key(hash: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + hash.len());
    key.push(BLOCK_HASH_PREFIX);
    key.extend_from_slice(hash);
    key
}

fn tx_id_key(tx_id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + tx_id.len());
    key.push(TX_ID_PREFIX);
    key.extend_from_slice(tx_id);
    key
}

fn encode_loc(loc: &FileLocPointer) -> [u8; 24] {
    let mut buf = [0u8; 24];
    buf[0..8].copy_from_slice(&loc.file_suffix_num.to_be_bytes());
    buf[8..16].copy_from_slice(&loc.offset.to_be_bytes());
    buf[16..24].copy_from_slice(&loc.bytes_length.to_be_bytes());
    buf
}

fn decode_loc(buf: &[u8]) -> FileLocPointer {
    FileLocPointer {
        file_suffix_num: SegmentNum::from_be_bytes(buf[0..8].try_into().unwrap()),
        offset: u64::from_be_bytes(buf[8..16].try_into().unwrap()),
        bytes_length: u64::from_be_bytes(buf[16..24].try_into().unwrap()),
    }
}

/// The block-number index stores the location plus the block's hash, so
/// that the chain tip summary can be rebuilt on restart without re-reading
/// and re-hashing block bytes.
fn encode_loc_and_hash(loc: &FileLocPointer, hash: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + hash.len());
    buf.extend_from_slice(&encode_loc(loc));
    buf.extend_from_slice(hash);
    buf
}

fn decode_loc_and_hash(buf: &[u8]) -> (FileLocPointer, Vec<u8>) {
    (decode_loc(&buf[..24]), buf[24..].to_vec())
}

impl Index {
    pub fn open(path: &std::path::Path) -> Result<Index> {
        let db = sled::open(path)?;
        Ok(Index { db })
    }

    /// Atomically writes all index entries derived from one block: if any
    /// entry cannot be written, the whole batch fails and nothing becomes
    /// visible (spec.md §4.4).
    pub fn index_block(&self, info: &BlockIndexInfo) -> Result<()> {
        let mut batch = sled::Batch::default();
        batch.insert(
            &block_num_key(info.block_num)[..],
            encode_loc_and_hash(&info.block_loc, info.block_hash),
        );
        batch.insert(
            &block_hash_key(info.block_hash)[..],
            &info.block_num.to_be_bytes()[..],
        );
        for (tx_id, loc) in &info.tx_locs {
            batch.insert(&tx_id_key(tx_id)[..], &encode_loc(loc)[..]);
        }
        batch.insert(LAST_INDEXED_KEY, &info.block_num.to_be_bytes()[..]);
        self.db.apply_batch(batch)?;
        Ok(())
    }

    pub fn get_last_block_indexed(&self) -> Result<BlockNum> {
        Ok(self
            .db
            .get(LAST_INDEXED_KEY)?
            .map(|v| BlockNum::from_be_bytes(v.as_ref().try_into().unwrap()))
            .unwrap_or(0))
    }

    pub fn get_block_loc_by_block_num(&self, n: BlockNum) -> Result<Option<FileLocPointer>> {
        Ok(self
            .db
            .get(block_num_key(n))?
            .map(|v| decode_loc_and_hash(&v).0))
    }

    /// Returns the block's location and its hash, as recorded at index time.
    pub fn get_block_loc_and_hash_by_block_num(
        &self,
        n: BlockNum,
    ) -> Result<Option<(FileLocPointer, Vec<u8>)>> {
        Ok(self.db.get(block_num_key(n))?.map(|v| decode_loc_and_hash(&v)))
    }

    pub fn get_block_num_by_hash(&self, hash: &[u8]) -> Result<Option<BlockNum>> {
        Ok(self
            .db
            .get(block_hash_key(hash))?
            .map(|v| BlockNum::from_be_bytes(v.as_ref().try_into().unwrap())))
    }

    /// Composes `blockHashIndex[h] -> blockNum` with `blockNumIndex[blockNum]`,
    /// per the indirection choice documented in SPEC_FULL.md §4.4.
    pub fn get_block_loc_by_hash(&self, hash: &[u8]) -> Result<Option<FileLocPointer>> {
        match self.get_block_num_by_hash(hash)? {
            Some(n) => self.get_block_loc_by_block_num(n),
            None => Ok(None),
        }
    }

    pub fn get_tx_loc(&self, tx_id: &[u8]) -> Result<Option<FileLocPointer>> {
        Ok(self.db.get(tx_id_key(tx_id))?.map(|v| decode_loc(&v)))
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// The checkpoint lives in the same embedded store as the rest of the
    /// index, under its own key, so that a single `flush` call makes both
    /// durable together.
    pub fn get_checkpoint(&self) -> Result<Option<CheckpointInfo>> {
        match self.db.get(CHECKPOINT_KEY)? {
            Some(v) => Ok(Some(CheckpointInfo::decode(&v)?)),
            None => Ok(None),
        }
    }

    pub fn put_checkpoint(&self, cp: &CheckpointInfo) -> Result<()> {
        self.db.insert(CHECKPOINT_KEY, cp.encode())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let idx = Index::open(&dir.path().join("db")).unwrap();

        assert_eq!(idx.get_last_block_indexed().unwrap(), 0);

        let loc = FileLocPointer::for_block(0, 10);
        let tx_loc = FileLocPointer::for_tx(0, 20, 5);
        idx.index_block(&BlockIndexInfo {
            block_num: 1,
            block_hash: b"hash1",
            block_loc: loc,
            tx_locs: vec![(b"tx1", tx_loc)],
        })
        .unwrap();

        assert_eq!(idx.get_last_block_indexed().unwrap(), 1);
        assert_eq!(idx.get_block_loc_by_block_num(1).unwrap(), Some(loc));
        assert_eq!(idx.get_block_loc_by_hash(b"hash1").unwrap(), Some(loc));
        assert_eq!(idx.get_block_loc_by_block_num(2).unwrap(), None);
        assert_eq!(idx.get_tx_loc(b"tx1").unwrap(), Some(tx_loc));
        assert_eq!(idx.get_tx_loc(b"missing").unwrap(), None);
    }

    #[test]
    fn batch_is_all_or_nothing_in_effect() {
        // sled's apply_batch is atomic by construction; this test documents
        // that a single index_block call either fully appears or not at all
        // from the caller's perspective.
        let dir = tempfile::tempdir().unwrap();
        let idx = Index::open(&dir.path().join("db")).unwrap();
        idx.index_block(&BlockIndexInfo {
            block_num: 1,
            block_hash: b"h",
            block_loc: FileLocPointer::for_block(0, 0),
            tx_locs: vec![],
        })
        .unwrap();
        assert!(idx.get_block_loc_by_block_num(1).unwrap().is_some());
        assert!(idx.get_block_num_by_hash(b"h").unwrap().is_some());
    }
}
