//! Fixed-field binary snapshot primitives.
//!
//! Everything is written in host byte order with no header; callers must not
//! mix snapshots between incompatible builds. Readers validate lengths and
//! ordering so a truncated or corrupted file surfaces as an [`Error`] instead
//! of garbage state.

use crate::codec;
use crate::error::{Error, Result};
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub fn create_snapshot<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

pub fn open_snapshot<P: AsRef<Path>>(path: P) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_u64::<NativeEndian>(v)?;
    Ok(())
}

pub fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    Ok(r.read_u64::<NativeEndian>()?)
}

pub fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_i32::<NativeEndian>(v)?;
    Ok(())
}

pub fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    Ok(r.read_i32::<NativeEndian>()?)
}

/// Write `len: u64` followed by the raw bytes.
pub fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    write_u64(w, bytes.len() as u64)?;
    w.write_all(bytes)?;
    Ok(())
}

/// Read a length-prefixed byte block. The declared length is never trusted
/// for allocation; only bytes actually present are buffered.
pub fn read_bytes<R: Read>(r: &mut R, what: &str) -> Result<Vec<u8>> {
    let len = read_u64(r)?;
    let mut buf = Vec::new();
    r.by_ref().take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(Error::corrupt(format!("{what}: declared {len} bytes, found {}", buf.len())));
    }
    Ok(buf)
}

pub fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    write_bytes(w, s.as_bytes())
}

pub fn read_string<R: Read>(r: &mut R, what: &str) -> Result<String> {
    let bytes = read_bytes(r, what)?;
    String::from_utf8(bytes).map_err(|_| Error::corrupt(format!("{what}: string is not valid UTF-8")))
}

/// Read a length-prefixed compressed id set and check it is well formed:
/// the codec must consume exactly the declared bytes and the ids must be
/// strictly ascending. Returns the raw buffer alongside the decoded ids.
pub fn read_id_set<R: Read>(r: &mut R, what: &str) -> Result<(Vec<u8>, Vec<u64>)> {
    let bytes = read_bytes(r, what)?;
    let (ids, consumed) = codec::decode_with_len(&bytes)?;
    if consumed != bytes.len() {
        return Err(Error::corrupt(format!("{what}: {} bytes declared, {consumed} encoded", bytes.len())));
    }
    if ids.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::corrupt(format!("{what}: ids are not strictly ascending")));
    }
    Ok((bytes, ids))
}

/// Fails unless the reader is exhausted.
pub fn expect_eof<R: Read>(r: &mut R) -> Result<()> {
    let mut probe = [0u8; 1];
    match r.read(&mut probe)? {
        0 => Ok(()),
        _ => Err(Error::corrupt("trailing bytes after snapshot")),
    }
}
