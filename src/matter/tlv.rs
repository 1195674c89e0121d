//! TLV glue over `rs_matter::tlv`.
//!
//! `rs_matter` provides the encoder (`TLVWrite`) and the zero-copy reader
//! (`TLVElement`, `TLVSequence`). This module adds the growable, size-capped
//! writer the engines encode into, plus lookups for optional context fields.

use rs_matter::error::{Error, ErrorCode};
pub use rs_matter::tlv::{TLVElement, TLVSequence, TLVTag, TLVWrite};

/// Growable TLV output with a hard size limit.
///
/// Writes past the limit fail with `ErrorCode::NoSpace` and leave the bytes
/// written so far in place; callers rewind to a tail they took earlier.
/// Part of the limit can be held back for a trailer with [`TlvBuf::reserve`].
#[derive(Debug, Clone)]
pub struct TlvBuf {
    buf: Vec<u8>,
    limit: usize,
    reserved: usize,
}

impl TlvBuf {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            reserved: 0,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.limit
            .saturating_sub(self.reserved)
            .saturating_sub(self.buf.len())
    }

    /// Hold back `n` bytes of the limit.
    pub fn reserve(&mut self, n: usize) -> Result<(), Error> {
        if self.remaining() < n {
            return Err(ErrorCode::NoSpace.into());
        }
        self.reserved += n;
        Ok(())
    }

    pub fn unreserve(&mut self, n: usize) {
        self.reserved = self.reserved.saturating_sub(n);
    }

    /// Copy already-encoded TLV, all or nothing.
    pub fn append(&mut self, encoded: &[u8]) -> Result<(), Error> {
        if self.remaining() < encoded.len() {
            return Err(ErrorCode::NoSpace.into());
        }
        self.buf.extend_from_slice(encoded);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl TLVWrite for TlvBuf {
    type Position = usize;

    fn write(&mut self, byte: u8) -> Result<(), Error> {
        if self.remaining() == 0 {
            return Err(ErrorCode::NoSpace.into());
        }
        self.buf.push(byte);
        Ok(())
    }

    fn get_tail(&self) -> Self::Position {
        self.buf.len()
    }

    fn rewind_to(&mut self, pos: Self::Position) {
        self.buf.truncate(pos);
    }
}

/// Context-tagged member `tag` of `seq`, searched from the start of the container.
pub fn field<'a>(seq: &TLVSequence<'a>, tag: u8) -> Result<TLVElement<'a>, Error> {
    seq.clone().scan_ctx(tag)
}

pub fn optional_field<'a>(seq: &TLVSequence<'a>, tag: u8) -> Option<TLVElement<'a>> {
    field(seq, tag).ok()
}

/// Copy already-encoded TLV into any writer, byte by byte.
pub fn write_raw(tw: &mut impl TLVWrite, encoded: &[u8]) -> Result<(), Error> {
    for byte in encoded {
        tw.write(*byte)?;
    }
    Ok(())
}
