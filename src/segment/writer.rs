use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::SegmentNum;

use super::naming::derive_segment_path;

/// Holds an append-positioned handle to one segment file.
///
/// `append` either writes the full buffer or returns an error; partial
/// writes from the underlying OS call are retried internally and never
/// exposed to callers.
pub struct Writer {
    path: PathBuf,
    suffix_num: SegmentNum,
    file: File,
}

impl Writer {
    pub fn open(root_dir: &Path, suffix_num: SegmentNum) -> io::Result<Writer> {
        let path = derive_segment_path(root_dir, suffix_num);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Writer {
            path,
            suffix_num,
            file,
        })
    }

    pub fn suffix_num(&self) -> SegmentNum {
        self.suffix_num
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Writes `bytes` at the current end of file. `sync_after` requests a
    /// durable flush (`fsync`-equivalent) before returning.
    pub fn append(&mut self, bytes: &[u8], sync_after: bool) -> io::Result<()> {
        write_all_retrying(&mut self.file, bytes)?;
        if sync_after {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Shrinks the file to exactly `size` bytes, discarding torn trailing
    /// bytes left by a crash mid-append, and repositions the append point.
    pub fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.file.set_len(size)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn close(self) {}
}

/// `Write::write` may perform a short write; retry until the whole buffer
/// is consumed or a real error occurs.
fn write_all_retrying(file: &mut File, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        match file.write(bytes) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer to segment",
                ))
            }
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
