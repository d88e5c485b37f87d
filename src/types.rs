//! Shared value types used across the block log.

pub type BlockNum = u64;
pub type SegmentNum = u64;

/// A `(segment#, offset, length)` triple used by the index.
///
/// `offset` is an absolute byte offset into the named segment. For block
/// pointers it points at the first byte of the payload (past the length
/// varint); `bytes_length` is used for transaction-granularity pointers and
/// is `0` for block pointers, in which case the reader re-reads the length
/// varint immediately preceding the payload via the block-stream path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLocPointer {
    pub file_suffix_num: SegmentNum,
    pub offset: u64,
    pub bytes_length: u64,
}

impl FileLocPointer {
    pub fn for_block(file_suffix_num: SegmentNum, payload_offset: u64) -> Self {
        FileLocPointer {
            file_suffix_num,
            offset: payload_offset,
            bytes_length: 0,
        }
    }

    pub fn for_tx(file_suffix_num: SegmentNum, offset: u64, bytes_length: u64) -> Self {
        FileLocPointer {
            file_suffix_num,
            offset,
            bytes_length,
        }
    }
}

/// Derived, in-memory summary of the chain tip. `height == lastBlockNumber`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockchainInfo {
    pub height: BlockNum,
    pub current_block_hash: Vec<u8>,
    pub previous_block_hash: Vec<u8>,
}

/// One block as handed to `Manager::add_block`: opaque payload bytes plus
/// the pre-computed accessors the wire-format layer (out of scope for this
/// crate) is expected to provide.
pub struct BlockEnvelope<'a> {
    pub payload: &'a [u8],
    pub hash: Vec<u8>,
    /// Byte offsets, relative to the start of `payload`, of each contained
    /// transaction's bytes, in order. The indexer derives lengths from
    /// consecutive differences (and payload end for the last one).
    pub tx_offsets: Vec<TxOffset>,
    pub previous_block_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TxOffset {
    pub id: Vec<u8>,
    pub offset: u64,
}

/// The block/transaction wire format is an external collaborator
/// (spec.md §1): this crate only consumes three deterministic accessors
/// over a block's opaque payload bytes. `Manager::add_block` is handed
/// these pre-computed via `BlockEnvelope` for the common append path, but
/// two startup-time paths have no caller present to supply a
/// `BlockEnvelope` and so call back into a held `BlockCodec` directly:
/// index resynchronisation (spec.md §4.6.1 step 7) rebuilds entries for
/// blocks discovered on segment bytes, and chain-tip rebuild (step 8)
/// derives `BlockchainInfo.previous_block_hash` from the tip block's own
/// payload, exactly as the live `add_block` path does.
pub trait BlockCodec: Send + Sync {
    fn hash(&self, payload: &[u8]) -> Vec<u8>;
    /// Byte offsets, relative to `payload`, of each contained transaction,
    /// in the same shape as `BlockEnvelope::tx_offsets`.
    fn tx_offsets(&self, payload: &[u8]) -> Vec<TxOffset>;
    fn previous_block_hash(&self, payload: &[u8]) -> Vec<u8>;
}
