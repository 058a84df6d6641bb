//! Var-length binary codec for hub-chain state values.
//!
//! The hub serializes cross-chain state with little-endian integers and
//! length-prefixed byte strings, where lengths use the compact varuint
//! encoding (`< 0xFD` inline, `0xFD` u16, `0xFE` u32, `0xFF` u64). Audit
//! paths use the same framing: a var-bytes leaf value followed by
//! `(position, hash)` hops up the tree.

use thiserror::Error;

/// Size of a tree hash in an audit path.
pub const HASH_SIZE: usize = 32;

/// Errors raised while reading hub-encoded binary data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input ended before the expected field.
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),
    /// A declared length exceeds the remaining input.
    #[error("declared length {0} exceeds remaining input")]
    LengthOutOfRange(u64),
    /// A byte-string field was not valid UTF-8.
    #[error("field is not valid utf-8: {0}")]
    InvalidString(String),
}

/// Sequential reader over hub-encoded bytes.
pub struct Source<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Source<'a> {
    /// Create a reader over `buf`.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8, CodecError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.read_bytes(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a compact varuint length.
    pub fn read_var_uint(&mut self) -> Result<u64, CodecError> {
        match self.read_byte()? {
            0xFD => Ok(u64::from(self.read_u16()?)),
            0xFE => Ok(u64::from(self.read_u32()?)),
            0xFF => self.read_u64(),
            n => Ok(u64::from(n)),
        }
    }

    /// Read a varuint-length-prefixed byte string.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_var_uint()?;
        let n = usize::try_from(len).map_err(|_| CodecError::LengthOutOfRange(len))?;
        if self.remaining() < n {
            return Err(CodecError::LengthOutOfRange(len));
        }
        self.read_bytes(n)
    }

    /// Read a 32-byte tree hash.
    pub fn read_hash(&mut self) -> Result<[u8; HASH_SIZE], CodecError> {
        let bytes = self.read_bytes(HASH_SIZE)?;
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

/// Growable writer producing hub-encoded bytes.
#[derive(Default)]
pub struct Sink {
    buf: Vec<u8>,
}

impl Sink {
    /// Create an empty sink.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append a single byte.
    pub fn write_byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    /// Append raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a little-endian u16.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian u64.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a compact varuint.
    pub fn write_var_uint(&mut self, v: u64) {
        if v < 0xFD {
            #[allow(clippy::cast_possible_truncation)]
            self.write_byte(v as u8);
        } else if v <= u64::from(u16::MAX) {
            self.write_byte(0xFD);
            #[allow(clippy::cast_possible_truncation)]
            self.write_u16(v as u16);
        } else if v <= u64::from(u32::MAX) {
            self.write_byte(0xFE);
            #[allow(clippy::cast_possible_truncation)]
            self.write_u32(v as u32);
        } else {
            self.write_byte(0xFF);
            self.write_u64(v);
        }
    }

    /// Append a varuint-length-prefixed byte string.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_uint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// View of the written bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the sink.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// A parsed Merkle audit path: the leaf value and the `(position, hash)`
/// hops binding it to the root.
pub struct AuditPath<'a> {
    /// The proven leaf value.
    pub value: &'a [u8],
    /// Sibling hashes with their left/right position bytes, leaf first.
    pub nodes: Vec<(u8, [u8; HASH_SIZE])>,
}

/// Parse the audit path returned by the hub's cross-states proof endpoint.
pub fn parse_audit_path(path: &[u8]) -> Result<AuditPath<'_>, CodecError> {
    let mut source = Source::new(path);
    let value = source.read_var_bytes()?;
    let mut nodes = Vec::with_capacity(source.remaining() / (HASH_SIZE + 1));
    while source.remaining() > 0 {
        let pos = source.read_byte()?;
        let hash = source.read_hash()?;
        nodes.push((pos, hash));
    }
    Ok(AuditPath { value, nodes })
}
