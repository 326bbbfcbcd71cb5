// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Primitive encodings shared by every frame.
//!
//! All integers are big-endian. Signed values travel as the unsigned
//! 32-bit two's-complement pattern; the conversion is done with explicit
//! arithmetic on `i64` so the wire form never depends on native overflow.
//!
//! ```text
//! U32     4 bytes, big-endian
//! I32     U32 carrying the two's-complement pattern
//! Byte    1 byte
//! String  U32 length + raw bytes (no terminator)
//! ```

use thiserror::Error;

const U32_MAX: i64 = 0xFFFF_FFFF;
const I32_MAX: i64 = 0x7FFF_FFFF;

/// Decoding errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    /// The payload ended before the requested field.
    #[error("truncated payload: {needed} bytes needed at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Map a signed value onto its unsigned wire pattern.
pub fn encode_i32(n: i32) -> u32 {
    let n = i64::from(n);
    let m = if n >= 0 { n } else { U32_MAX + (n + 1) };
    (m & U32_MAX) as u32
}

/// Inverse of [`encode_i32`].
pub fn decode_i32(m: u32) -> i32 {
    let m = i64::from(m);
    let n = if m <= I32_MAX { m } else { -(U32_MAX - m) - 1 };
    n as i32
}

/// Append-only encoding buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_byte(&mut self, b: u8) -> &mut Self {
        self.buf.push(b);
        self
    }

    pub fn put_u32(&mut self, n: u32) -> &mut Self {
        self.buf.extend_from_slice(&n.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, n: i32) -> &mut Self {
        self.put_u32(encode_i32(n))
    }

    /// Length-prefixed string. Lengths beyond `u32::MAX` cannot be framed
    /// and are clamped.
    pub fn put_string(&mut self, s: impl AsRef<[u8]>) -> &mut Self {
        let bytes = s.as_ref();
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        self.put_u32(len);
        self.buf.extend_from_slice(&bytes[..len as usize]);
        self
    }

    /// Overwrite a single byte already written.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the end of the buffer.
    pub fn set_byte(&mut self, offset: usize, b: u8) {
        self.buf[offset] = b;
    }

    /// Overwrite four bytes already written with a big-endian `u32`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` is past the end of the buffer.
    pub fn set_u32(&mut self, offset: usize, n: u32) {
        self.buf[offset..offset + 4]
            .copy_from_slice(&n.to_be_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over one frame's bytes.
///
/// Reads never cross the end of the slice it was built on, so a short
/// payload cannot bleed into the next frame.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Start reading at `pos` (e.g. past a frame header).
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self {
            buf,
            pos: pos.min(buf.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn get_byte(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        self.get_u32().map(decode_i32)
    }

    /// Raw length-prefixed bytes.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    /// Length-prefixed string. Invalid UTF-8 is replaced, not rejected.
    pub fn get_string(&mut self) -> Result<String, WireError> {
        self.get_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Length-prefixed string copied into a buffer of `capacity` bytes.
    ///
    /// Keeps at most `capacity - 1` bytes (room for a terminator in the
    /// fixed-size column it lands in) but always consumes the whole encoded
    /// string.
    pub fn get_string_bounded(&mut self, capacity: usize) -> Result<String, WireError> {
        let bytes = self.get_bytes()?;
        let keep = bytes.len().min(capacity.saturating_sub(1));
        Ok(String::from_utf8_lossy(&bytes[..keep]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_boundaries() {
        for n in [0, 1, -1, 42, -42, i32::MAX, i32::MIN] {
            assert_eq!(decode_i32(encode_i32(n)), n, "round trip of {}", n);
        }
    }

    #[test]
    fn test_i32_wire_pattern() {
        assert_eq!(encode_i32(-1), 0xFFFF_FFFF);
        assert_eq!(encode_i32(i32::MIN), 0x8000_0000);
        assert_eq!(encode_i32(i32::MAX), 0x7FFF_FFFF);
        assert_eq!(decode_i32(0x8000_0000), i32::MIN);
        assert_eq!(decode_i32(0xFFFF_FFFE), -2);
    }

    #[test]
    fn test_put_u32_is_big_endian() {
        let mut w = WireWriter::new();
        w.put_u32(0x0102_0304);
        assert_eq!(w.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_mixed_round_trip() {
        let mut w = WireWriter::new();
        w.put_byte(7)
            .put_i32(-20)
            .put_string("router-1")
            .put_string(b"")
            .put_u32(99);

        let buf = w.into_vec();
        let mut r = WireReader::new(&buf);
        assert_eq!(r.get_byte().unwrap(), 7);
        assert_eq!(r.get_i32().unwrap(), -20);
        assert_eq!(r.get_string().unwrap(), "router-1");
        assert_eq!(r.get_string().unwrap(), "");
        assert_eq!(r.get_u32().unwrap(), 99);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_string_raw_bytes() {
        let raw = [0u8, 0xff, 0x10, b'a'];
        let mut w = WireWriter::new();
        w.put_string(raw);
        let buf = w.into_vec();
        assert_eq!(&buf[..4], &4u32.to_be_bytes());

        let mut r = WireReader::new(&buf);
        assert_eq!(r.get_bytes().unwrap(), &raw);
    }

    #[test]
    fn test_bounded_string_truncates_and_consumes() {
        let mut w = WireWriter::new();
        w.put_string("abcdefgh").put_u32(5);
        let buf = w.into_vec();

        let mut r = WireReader::new(&buf);
        assert_eq!(r.get_string_bounded(4).unwrap(), "abc");
        assert_eq!(r.get_u32().unwrap(), 5);
    }

    #[test]
    fn test_bounded_string_fits() {
        let mut w = WireWriter::new();
        w.put_string("abc");
        let buf = w.into_vec();
        assert_eq!(WireReader::new(&buf).get_string_bounded(4).unwrap(), "abc");
        assert_eq!(WireReader::new(&buf).get_string_bounded(0).unwrap(), "");
    }

    #[test]
    fn test_truncated_reads() {
        let buf = [0u8, 0, 0];
        let mut r = WireReader::new(&buf);
        assert_eq!(
            r.get_u32(),
            Err(WireError::Truncated {
                offset: 0,
                needed: 4,
                available: 3,
            })
        );

        // String length claims more bytes than the frame holds.
        let mut w = WireWriter::new();
        w.put_u32(10).put_byte(b'x');
        let buf = w.into_vec();
        assert!(WireReader::new(&buf).get_string().is_err());
    }

    #[test]
    fn test_set_in_place() {
        let mut w = WireWriter::new();
        w.put_u32(0).put_byte(0);
        w.set_u32(0, 5);
        w.set_byte(4, 2);
        assert_eq!(w.as_slice(), &[0, 0, 0, 5, 2]);
    }

    #[test]
    fn test_reader_at_clamps() {
        let buf = [1u8, 2];
        let r = WireReader::at(&buf, 10);
        assert_eq!(r.remaining(), 0);
    }
}
