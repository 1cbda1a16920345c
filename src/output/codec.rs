//! Little-endian record encoding shared by the archive writer and reader.
//!
//! Every archive file starts with [`ARCHIVE_MAGIC`] and a one-byte file kind,
//! followed by tagged records.

use crate::utils::config::ARCHIVE_MAGIC;
use crate::utils::error::WriterError;
use std::io::Write;

/// File kind byte following the magic
pub const KIND_ANCHOR: u8 = b'A';
pub const KIND_DEFINITIONS: u8 = b'D';
pub const KIND_EVENTS: u8 = b'E';

// Definition record tags
pub const TAG_STRING: u8 = 1;
pub const TAG_LOCATION_GROUP: u8 = 2;
pub const TAG_LOCATION: u8 = 3;
pub const TAG_REGION: u8 = 4;
pub const TAG_METRIC: u8 = 5;

// Event record tags
pub const TAG_ENTER: u8 = 10;
pub const TAG_LEAVE: u8 = 11;
pub const TAG_METRIC_SAMPLE: u8 = 12;

// Value type tags for attributes and metric samples
pub const TYPE_BOOL: u8 = 1;
pub const TYPE_INT: u8 = 2;
pub const TYPE_UINT: u8 = 3;
pub const TYPE_DOUBLE: u8 = 4;
pub const TYPE_STRING: u8 = 5;

// Location kind codes (OTF2 location types, plus async tracks)
pub const LOCATION_CPU_THREAD: u8 = 1;
pub const LOCATION_METRIC: u8 = 3;
pub const LOCATION_ASYNC_TRACK: u8 = 4;

/// Thin writer over any `Write` sink
pub struct Encoder<W: Write> {
    inner: W,
}

impl<W: Write> Encoder<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Magic plus file kind
    pub fn header(&mut self, kind: u8) -> Result<(), WriterError> {
        self.inner.write_all(ARCHIVE_MAGIC)?;
        self.u8(kind)
    }

    pub fn u8(&mut self, value: u8) -> Result<(), WriterError> {
        self.inner.write_all(&[value])?;
        Ok(())
    }

    pub fn u16(&mut self, value: u16) -> Result<(), WriterError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn u32(&mut self, value: u32) -> Result<(), WriterError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn u64(&mut self, value: u64) -> Result<(), WriterError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn i64(&mut self, value: i64) -> Result<(), WriterError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn f64(&mut self, value: f64) -> Result<(), WriterError> {
        self.u64(value.to_bits())
    }

    /// Length-prefixed UTF-8 string
    pub fn str(&mut self, value: &str) -> Result<(), WriterError> {
        self.u32(value.len() as u32)?;
        self.inner.write_all(value.as_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), WriterError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Cursor over an in-memory archive file
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Check magic and file kind
    pub fn header(&mut self, kind: u8) -> Result<(), WriterError> {
        let magic = self.take(ARCHIVE_MAGIC.len())?;
        if magic != ARCHIVE_MAGIC {
            return Err(WriterError::InvalidArchive("bad magic".to_string()));
        }
        let found = self.u8()?;
        if found != kind {
            return Err(WriterError::InvalidArchive(format!(
                "expected file kind '{}', found '{}'",
                kind as char, found as char
            )));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WriterError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
        let Some(end) = end else {
            return Err(WriterError::InvalidArchive(format!(
                "truncated record at byte {}",
                self.pos
            )));
        };
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WriterError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, WriterError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, WriterError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, WriterError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, WriterError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, WriterError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64, WriterError> {
        Ok(f64::from_bits(self.u64()?))
    }

    pub fn str(&mut self) -> Result<String, WriterError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| WriterError::InvalidArchive(format!("invalid UTF-8 string: {}", e)))
    }
}
