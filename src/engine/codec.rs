//! LSMKV - Entry Codec
//! Length-prefixed binary framing shared by WAL segments and SSTables.
//!
//! ## Data record
//! ```text
//! [key_len: u64 LE][val_len: u64 LE][key: N bytes][value: M bytes]
//! ```
//! A tombstone is written with `val_len = u64::MAX` and no value bytes,
//! so an empty value and a deletion stay distinguishable.
//!
//! ## Index record
//! ```text
//! [key_len: u64 LE][offset: zig-zag varint][key: N bytes]
//! ```
//!
//! Records carry no checksum. Callers that need integrity checks use
//! [`DebugEntry`], which is serialized with bincode and carries a CRC32.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{LsmError, Result};
use crate::types::{Entry, IndexEntry};

/// Value-length marker for a tombstone.
pub const TOMBSTONE_LEN: u64 = u64::MAX;

/// Fixed header size of a data record.
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single key or value; larger lengths are treated as garbage.
pub const MAX_FIELD_LEN: u64 = 1 << 31;

/// Longest encoding of a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

/// Encoded size of a data record.
pub fn encoded_len(entry: &Entry) -> usize {
    HEADER_SIZE + entry.size()
}

/// Encodes data records through a reusable scratch buffer.
#[derive(Debug, Default)]
pub struct EntryCodec {
    buf: BytesMut,
}

impl EntryCodec {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Write `entry` at the current position of `w` and return the offset
    /// at which the record starts. The record occupies [`encoded_len`] bytes.
    pub fn encode<W: Write + Seek>(&mut self, w: &mut W, entry: &Entry) -> Result<u64> {
        if entry.key.is_empty() {
            return Err(LsmError::BadEntry("entry has no key".into()));
        }
        if entry.key.len() as u64 > MAX_FIELD_LEN
            || entry.value.as_ref().map_or(0, |v| v.len()) as u64 > MAX_FIELD_LEN
        {
            return Err(LsmError::BadEntry("entry exceeds maximum field length".into()));
        }

        self.buf.clear();
        self.buf.reserve(encoded_len(entry));
        self.buf.put_u64_le(entry.key.len() as u64);
        match &entry.value {
            Some(value) => self.buf.put_u64_le(value.len() as u64),
            None => self.buf.put_u64_le(TOMBSTONE_LEN),
        }
        self.buf.put_slice(&entry.key);
        if let Some(value) = &entry.value {
            self.buf.put_slice(value);
        }

        let offset = w.stream_position()?;
        w.write_all(&self.buf)?;
        Ok(offset)
    }
}

/// Decode one record. A short read surfaces as an `UnexpectedEof` I/O error.
pub fn decode<R: Read>(r: &mut R) -> Result<Entry> {
    match try_decode(r)? {
        Some(entry) => Ok(entry),
        None => Err(LsmError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no record at reader position",
        ))),
    }
}

/// Decode the record starting at `offset`.
pub fn decode_at<R: Read + Seek>(r: &mut R, offset: u64) -> Result<Entry> {
    r.seek(SeekFrom::Start(offset))?;
    decode(r)
}

/// Decode one record, returning `None` on a clean end of stream.
pub fn try_decode<R: Read>(r: &mut R) -> Result<Option<Entry>> {
    let mut header = [0u8; HEADER_SIZE];
    let n = read_full(r, &mut header)?;
    if n == 0 {
        return Ok(None);
    }
    if n < HEADER_SIZE {
        return Err(LsmError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("record header truncated after {n} bytes"),
        )));
    }

    let key_len = LittleEndian::read_u64(&header[..8]);
    let val_len = LittleEndian::read_u64(&header[8..]);
    if key_len > MAX_FIELD_LEN || (val_len != TOMBSTONE_LEN && val_len > MAX_FIELD_LEN) {
        return Err(LsmError::BadEntry(format!(
            "implausible record lengths key={key_len} value={val_len}"
        )));
    }

    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;

    let value = if val_len == TOMBSTONE_LEN {
        None
    } else {
        let mut value = vec![0u8; val_len as usize];
        r.read_exact(&mut value)?;
        Some(value)
    };

    Ok(Some(Entry { key, value }))
}

/// Write an index record and return its encoded size.
pub fn encode_index<W: Write>(w: &mut W, entry: &IndexEntry) -> Result<usize> {
    let mut buf = BytesMut::with_capacity(8 + MAX_VARINT_LEN + entry.key.len());
    buf.put_u64_le(entry.key.len() as u64);
    put_varint(&mut buf, entry.offset);
    buf.put_slice(&entry.key);
    w.write_all(&buf)?;
    Ok(buf.len())
}

/// Read an index record, `None` on a clean end of stream.
pub fn decode_index<R: Read>(r: &mut R) -> Result<Option<IndexEntry>> {
    let mut len_buf = [0u8; 8];
    let n = read_full(r, &mut len_buf)?;
    if n == 0 {
        return Ok(None);
    }
    if n < len_buf.len() {
        return Err(LsmError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "index record truncated",
        )));
    }
    let key_len = LittleEndian::read_u64(&len_buf);
    if key_len > MAX_FIELD_LEN {
        return Err(LsmError::BadEntry(format!("implausible index key length {key_len}")));
    }
    let offset = read_varint(r)?;
    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;
    Ok(Some(IndexEntry { key, offset }))
}

/// Append `v` as a zig-zag varint.
pub fn put_varint(buf: &mut BytesMut, v: i64) {
    let mut ux = ((v << 1) ^ (v >> 63)) as u64;
    while ux >= 0x80 {
        buf.put_u8(ux as u8 | 0x80);
        ux >>= 7;
    }
    buf.put_u8(ux as u8);
}

/// Read a zig-zag varint written by [`put_varint`].
pub fn read_varint<R: Read>(r: &mut R) -> Result<i64> {
    let mut ux: u64 = 0;
    let mut shift = 0u32;
    for i in 0..MAX_VARINT_LEN {
        let b = r.read_u8()?;
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(LsmError::BadEntry("varint overflows 64 bits".into()));
            }
            ux |= (b as u64) << shift;
            let mut x = (ux >> 1) as i64;
            if ux & 1 != 0 {
                x = !x;
            }
            return Ok(x);
        }
        ux |= ((b & 0x7f) as u64) << shift;
        shift += 7;
    }
    Err(LsmError::BadEntry("varint overflows 64 bits".into()))
}

/// Fill `buf` as far as the stream allows; returns the bytes read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

/// An entry paired with `crc32(key ‖ value)`, for validation and dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub crc: u32,
}

impl DebugEntry {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            key: entry.key.clone(),
            value: entry.value.clone(),
            crc: Self::checksum(&entry.key, entry.value.as_deref()),
        }
    }

    /// CRC32 over the key followed by the value bytes.
    pub fn checksum(key: &[u8], value: Option<&[u8]>) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(key);
        if let Some(value) = value {
            hasher.update(value);
        }
        hasher.finalize()
    }

    pub fn verify(&self) -> Result<()> {
        let expected = Self::checksum(&self.key, self.value.as_deref());
        if expected != self.crc {
            return Err(LsmError::Corruption(format!(
                "crc mismatch: stored {:#010x}, computed {:#010x}",
                self.crc, expected
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize and verify the checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let entry: DebugEntry = bincode::deserialize(bytes)?;
        entry.verify()?;
        Ok(entry)
    }

    pub fn into_entry(self) -> Result<Entry> {
        self.verify()?;
        Ok(Entry {
            key: self.key,
            value: self.value,
        })
    }
}
