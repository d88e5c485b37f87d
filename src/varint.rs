//! Unsigned LEB128 varint codec.
//!
//! 7 data bits per byte, high bit set to signal continuation. Encode and
//! decode must stay bit-exact across versions of this crate: it is the
//! on-disk format for both block-record length prefixes and the checkpoint
//! record (spec: "Varint format").

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Writes `value` as a varint and returns the number of bytes written.
pub fn write<W: Write>(w: &mut W, mut value: u64) -> io::Result<usize> {
    let mut buf = [0u8; 10];
    let mut n = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf[n] = byte;
        n += 1;
        if value == 0 {
            break;
        }
    }
    w.write_all(&buf[..n])?;
    Ok(n)
}

pub fn encoded_len(mut value: u64) -> usize {
    let mut n = 1;
    while value >= 0x80 {
        value >>= 7;
        n += 1;
    }
    n
}

/// Result of attempting to read one varint from a stream.
pub enum Read64 {
    Value(u64),
    /// Clean end of file: no bytes were read at all.
    Eof,
    /// At least one byte was consumed before the stream ended.
    Truncated,
}

/// Reads a single varint, distinguishing a clean EOF (nothing read yet)
/// from a truncated one (mid-varint EOF), which the block stream reader
/// needs in order to tell "no more records" apart from "torn trailing
/// record".
pub fn read<R: Read>(r: &mut R) -> io::Result<Read64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut byte = [0u8; 1];
    let mut read_any = false;
    loop {
        match r.read(&mut byte) {
            Ok(0) => {
                return Ok(if read_any { Read64::Truncated } else { Read64::Eof });
            }
            Ok(_) => {
                read_any = true;
                value |= ((byte[0] & 0x7f) as u64) << shift;
                if byte[0] & 0x80 == 0 {
                    return Ok(Read64::Value(value));
                }
                shift += 7;
                if shift >= 64 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Decodes a varint from an in-memory buffer, for the checkpoint record.
pub fn decode_buf(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::Decode("varint too long".into()));
        }
    }
    Err(Error::Decode("varint truncated".into()))
}
