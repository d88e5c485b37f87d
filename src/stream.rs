//! Block stream reader: consumes consecutive length-prefixed block records,
//! optionally spanning multiple segments.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::segment::{Reader, RecordOutcome};
use crate::types::SegmentNum;

/// Placement of one yielded record: `(fileNum, blockStartOffset,
/// blockBytesOffset)` in spec terms.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub file_num: SegmentNum,
    pub block_start_offset: u64,
    pub block_bytes_offset: u64,
}

pub struct StreamItem {
    pub payload: Vec<u8>,
    pub placement: Placement,
}

/// A lazy, finite sequence of block records read from one or more segments
/// in suffix order.
///
/// When the current segment is exhausted cleanly and is below `end_segment`,
/// the stream transparently advances to `current + 1` at offset 0. If
/// `end_segment` is `None`, the stream is restricted to the single starting
/// segment. A clean end-of-file terminates the sequence with no error; an
/// unexpected end-of-segment is surfaced once as an `Err` item and then the
/// stream is exhausted.
pub struct BlockStream {
    root_dir: PathBuf,
    current_segment: SegmentNum,
    end_segment: Option<SegmentNum>,
    reader: Reader,
    done: bool,
}

impl BlockStream {
    pub fn open(
        root_dir: impl Into<PathBuf>,
        start_segment: SegmentNum,
        start_offset: u64,
        end_segment: Option<SegmentNum>,
    ) -> Result<BlockStream> {
        let root_dir = root_dir.into();
        let mut reader = Reader::open(&root_dir, start_segment)?;
        reader.seek(start_offset)?;
        Ok(BlockStream {
            root_dir,
            current_segment: start_segment,
            end_segment,
            reader,
            done: false,
        })
    }

    /// Restricted to a single segment, starting at `offset`. Used by the
    /// recovery scanner and by by-number/by-hash retrieval.
    pub fn single_segment(
        root_dir: impl Into<PathBuf>,
        segment: SegmentNum,
        offset: u64,
    ) -> Result<BlockStream> {
        Self::open(root_dir, segment, offset, None)
    }

    fn advance_segment(&mut self) -> Result<bool> {
        let next = self.current_segment + 1;
        if self.end_segment.map_or(true, |end| next > end) {
            return Ok(false);
        }
        let path = crate::segment::derive_segment_path(&self.root_dir, next);
        if !path.exists() {
            return Ok(false);
        }
        self.reader = Reader::open(&self.root_dir, next)?;
        self.current_segment = next;
        Ok(true)
    }
}

impl Iterator for BlockStream {
    type Item = Result<StreamItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let outcome = match self.reader.read_record() {
                Ok(o) => o,
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::Io(e)));
                }
            };
            match outcome {
                RecordOutcome::Complete {
                    start_offset,
                    payload_offset,
                    payload,
                } => {
                    return Some(Ok(StreamItem {
                        payload,
                        placement: Placement {
                            file_num: self.current_segment,
                            block_start_offset: start_offset,
                            block_bytes_offset: payload_offset,
                        },
                    }));
                }
                RecordOutcome::Eof => {
                    match self.advance_segment() {
                        Ok(true) => continue,
                        Ok(false) => {
                            self.done = true;
                            return None;
                        }
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                RecordOutcome::UnexpectedEndOfSegment => {
                    self.done = true;
                    return Some(Err(Error::UnexpectedEndOfSegment));
                }
            }
        }
    }
}
