//! The durable `(segment#, segment-size, last-block#)` triple.

use crate::error::Result;
use crate::types::{BlockNum, SegmentNum};
use crate::varint;

pub const CHECKPOINT_KEY: &[u8] = b"ckpt";

/// `latestFileChunksize` bytes of segment `latestFileChunkSuffixNum` are
/// committed; blocks `1..=lastBlockNumber` are durable; all earlier
/// segments are full and immutable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub latest_file_chunk_suffix_num: SegmentNum,
    pub latest_file_chunk_size: u64,
    pub last_block_number: BlockNum,
}

impl CheckpointInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        varint::write(&mut buf, self.latest_file_chunk_suffix_num).unwrap();
        varint::write(&mut buf, self.latest_file_chunk_size).unwrap();
        varint::write(&mut buf, self.last_block_number).unwrap();
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<CheckpointInfo> {
        let (suffix, n1) = varint::decode_buf(buf)?;
        let (size, n2) = varint::decode_buf(&buf[n1..])?;
        let (last_block, _n3) = varint::decode_buf(&buf[n1 + n2..])?;
        Ok(CheckpointInfo {
            latest_file_chunk_suffix_num: suffix,
            latest_file_chunk_size: size,
            last_block_number: last_block,
        })
    }
}
