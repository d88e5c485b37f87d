//! Crash-recovery scan: reconciles the durable checkpoint against what is
//! actually present on disk by replaying one segment and tolerating (rather
//! than propagating) a torn trailing record.

use std::path::Path;

use crate::error::Result;
use crate::stream::BlockStream;
use crate::types::SegmentNum;

/// Ordered end-offsets of every complete record found while scanning a
/// segment from a given start offset. `record_end_offsets[i]` is the byte
/// offset immediately past the `i`-th record found (i.e. where the next
/// record, if any, begins).
pub struct ScanResult {
    pub record_end_offsets: Vec<u64>,
}

impl ScanResult {
    pub fn num_complete_records(&self) -> usize {
        self.record_end_offsets.len()
    }

    /// The offset immediately past the last complete record found, or
    /// `start_offset` if none were found. Any bytes beyond this offset are
    /// a torn trailing write and must be truncated away.
    pub fn end_offset(&self, start_offset: u64) -> u64 {
        self.record_end_offsets.last().copied().unwrap_or(start_offset)
    }
}

/// Scans segment `segment` starting at `start_offset`, recording the end
/// offset of every complete record found until a clean end of file or an
/// unexpected end of segment. The latter is swallowed here: a torn trailing
/// record is an expected outcome of an unclean shutdown, not a fatal error
/// (spec.md §4.5).
pub fn scan_segment(
    root_dir: &Path,
    segment: SegmentNum,
    start_offset: u64,
) -> Result<ScanResult> {
    let stream = BlockStream::single_segment(root_dir, segment, start_offset)?;
    let mut record_end_offsets = Vec::new();
    for item in stream {
        match item {
            Ok(item) => {
                record_end_offsets.push(item.placement.block_bytes_offset + item.payload.len() as u64);
            }
            Err(crate::error::Error::UnexpectedEndOfSegment) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(ScanResult { record_end_offsets })
}
