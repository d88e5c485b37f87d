use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::types::SegmentNum;
use crate::varint::{self, Read64};

use super::naming::derive_segment_path;

/// Outcome of reading one length-prefixed record at the reader's current
/// position.
pub enum RecordOutcome {
    /// A complete record was read. `start_offset` is the offset of the
    /// length varint; `payload_offset` is the offset of the first payload
    /// byte (i.e. `start_offset + varint_len`).
    Complete {
        start_offset: u64,
        payload_offset: u64,
        payload: Vec<u8>,
    },
    /// Clean end of file: no bytes remain. Not an error.
    Eof,
    /// A length varint was read but the payload (or the varint itself) was
    /// truncated before the segment ended. The caller (recovery scanner)
    /// interprets this as a torn trailing record.
    UnexpectedEndOfSegment,
}

/// A read handle opened at a specific offset into one segment.
pub struct Reader {
    file: File,
}

impl Reader {
    pub fn open(root_dir: &Path, suffix_num: SegmentNum) -> io::Result<Reader> {
        let path = derive_segment_path(root_dir, suffix_num);
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Reader { file })
    }

    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    /// Reads exactly `len` bytes at `offset`. Used for transaction-granular
    /// reads, where the caller already knows the exact length from the
    /// index and a short read indicates real corruption, not a valid "end
    /// of stream" outcome.
    pub fn read_exact_at(&mut self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        self.seek(offset)?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads one length-prefixed record starting at the reader's current
    /// position, advancing past it on success.
    pub fn read_record(&mut self) -> io::Result<RecordOutcome> {
        let start_offset = self.position()?;
        let len = match varint::read(&mut self.file)? {
            Read64::Eof => return Ok(RecordOutcome::Eof),
            Read64::Truncated => return Ok(RecordOutcome::UnexpectedEndOfSegment),
            Read64::Value(v) => v,
        };
        let payload_offset = self.position()?;
        let mut payload = vec![0u8; len as usize];
        match self.file.read_exact(&mut payload) {
            Ok(()) => Ok(RecordOutcome::Complete {
                start_offset,
                payload_offset,
                payload,
            }),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Ok(RecordOutcome::UnexpectedEndOfSegment)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::writer::Writer;
    use super::*;
    use crate::varint;

    fn write_record(w: &mut Writer, payload: &[u8]) {
        let mut buf = Vec::new();
        varint::write(&mut buf, payload.len() as u64).unwrap();
        buf.extend_from_slice(payload);
        w.append(&buf, true).unwrap();
    }

    #[test]
    fn reads_records_and_detects_eof() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = Writer::open(dir.path(), 0).unwrap();
        write_record(&mut w, b"abc");
        write_record(&mut w, b"de");

        let mut r = Reader::open(dir.path(), 0).unwrap();
        match r.read_record().unwrap() {
            RecordOutcome::Complete { payload, .. } => assert_eq!(payload, b"abc"),
            _ => panic!("expected complete record"),
        }
        match r.read_record().unwrap() {
            RecordOutcome::Complete { payload, .. } => assert_eq!(payload, b"de"),
            _ => panic!("expected complete record"),
        }
        assert!(matches!(r.read_record().unwrap(), RecordOutcome::Eof));
    }

    #[test]
    fn detects_torn_trailing_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = Writer::open(dir.path(), 0).unwrap();
        write_record(&mut w, b"abc");
        // Simulate a crash mid-write: a length prefix claiming more bytes
        // than actually follow.
        let mut tail = Vec::new();
        varint::write(&mut tail, 10).unwrap();
        tail.extend_from_slice(b"short");
        w.append(&tail, true).unwrap();

        let mut r = Reader::open(dir.path(), 0).unwrap();
        assert!(matches!(r.read_record().unwrap(), RecordOutcome::Complete { .. }));
        assert!(matches!(
            r.read_record().unwrap(),
            RecordOutcome::UnexpectedEndOfSegment
        ));
    }
}
