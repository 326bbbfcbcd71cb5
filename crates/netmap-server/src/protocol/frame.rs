// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing.
//!
//! TCP has no message boundaries. Every command is wrapped in an 8-byte
//! header whose first word counts the *whole* frame, header included:
//!
//! ```text
//! +--------------------+---------------------+-----------------+
//! | Length (4B BE)     | Command (4B BE)     | Payload         |
//! +--------------------+---------------------+-----------------+
//! ```
//!
//! # Example
//!
//! ```
//! use netmap_server::protocol::{Command, FrameBuilder, peek_frame_header, ParseResult};
//!
//! let mut b = FrameBuilder::new(Command::CloseMap);
//! b.put_i32(7);
//! let frame = b.finish();
//! assert_eq!(frame.len(), 12);
//! assert_eq!(
//!     peek_frame_header(frame.as_bytes(), 1024),
//!     ParseResult::Complete { len: 12, code: Command::CloseMap.code() }
//! );
//! ```

use super::codec::{WireReader, WireWriter};
use super::command::Command;
use std::ops::{Deref, DerefMut};

/// Frame header size (length + command code).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Default maximum frame size (1 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Result of inspecting the head of a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// A whole frame of `len` bytes is buffered.
    Complete { len: usize, code: u32 },
    /// Need this many more bytes.
    Incomplete(usize),
    /// Declared length cannot be consumed (below the header or above the
    /// limit).
    Invalid(usize),
}

/// Parse a frame header from a buffer without consuming.
pub fn peek_frame_header(buf: &[u8], max_size: usize) -> ParseResult {
    if buf.len() < FRAME_HEADER_SIZE {
        return ParseResult::Incomplete(FRAME_HEADER_SIZE - buf.len());
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len < FRAME_HEADER_SIZE || len > max_size {
        return ParseResult::Invalid(len);
    }

    if buf.len() < len {
        return ParseResult::Incomplete(len - buf.len());
    }

    let code = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    ParseResult::Complete { len, code }
}

/// An encoded frame ready to be written to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Wrap raw bytes. The caller vouches that they hold a full frame.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Command code from the header, if the frame is long enough to hold one.
    pub fn code(&self) -> Option<u32> {
        (self.0.len() >= FRAME_HEADER_SIZE).then(|| {
            u32::from_be_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
        })
    }

    pub fn command(&self) -> Option<Command> {
        self.code().and_then(Command::from_code)
    }

    /// Reader positioned on the first payload byte.
    pub fn payload(&self) -> WireReader<'_> {
        WireReader::at(&self.0, FRAME_HEADER_SIZE)
    }

    /// Copy of this frame with one payload byte replaced.
    pub fn with_byte(&self, offset: usize, b: u8) -> Self {
        let mut bytes = self.0.clone();
        if let Some(slot) = bytes.get_mut(offset) {
            *slot = b;
        }
        Self(bytes)
    }
}

/// Builds one frame: reserves the length word, writes the code, and patches
/// the length on [`finish`](Self::finish).
#[derive(Debug)]
pub struct FrameBuilder {
    writer: WireWriter,
}

impl FrameBuilder {
    pub fn new(command: Command) -> Self {
        let mut writer = WireWriter::with_capacity(64);
        writer.put_u32(0).put_u32(command.code());
        Self { writer }
    }

    pub fn finish(mut self) -> Frame {
        let len = u32::try_from(self.writer.len()).unwrap_or(u32::MAX);
        self.writer.set_u32(0, len);
        Frame(self.writer.into_vec())
    }
}

impl Deref for FrameBuilder {
    type Target = WireWriter;

    fn deref(&self) -> &WireWriter {
        &self.writer
    }
}

impl DerefMut for FrameBuilder {
    fn deref_mut(&mut self) -> &mut WireWriter {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_map(id: i32) -> Frame {
        let mut b = FrameBuilder::new(Command::CloseMap);
        b.put_i32(id);
        b.finish()
    }

    #[test]
    fn test_builder_patches_length() {
        let frame = FrameBuilder::new(Command::GetMapList).finish();
        assert_eq!(frame.as_bytes(), &[0, 0, 0, 8, 0, 0, 0, 2]);

        let frame = close_map(-3);
        assert_eq!(frame.len(), 12);
        assert_eq!(&frame.as_bytes()[..4], &12u32.to_be_bytes());
        assert_eq!(frame.command(), Some(Command::CloseMap));
        assert_eq!(frame.payload().get_i32().unwrap(), -3);
    }

    #[test]
    fn test_peek_incomplete_header() {
        let frame = close_map(1);
        assert_eq!(
            peek_frame_header(&frame.as_bytes()[..5], 1024),
            ParseResult::Incomplete(3)
        );
    }

    #[test]
    fn test_peek_incomplete_body() {
        let frame = close_map(1);
        assert_eq!(
            peek_frame_header(&frame.as_bytes()[..9], 1024),
            ParseResult::Incomplete(3)
        );
    }

    #[test]
    fn test_peek_complete_with_trailing_bytes() {
        let mut buf = close_map(1).into_bytes();
        buf.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(
            peek_frame_header(&buf, 1024),
            ParseResult::Complete { len: 12, code: 4 }
        );
    }

    #[test]
    fn test_peek_invalid_lengths() {
        let mut zero = vec![0u8; 8];
        zero[7] = 1;
        assert_eq!(peek_frame_header(&zero, 1024), ParseResult::Invalid(0));

        let huge = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 1];
        assert_eq!(
            peek_frame_header(&huge, 1024),
            ParseResult::Invalid(u32::MAX as usize)
        );
    }

    #[test]
    fn test_with_byte() {
        let frame = close_map(0);
        let patched = frame.with_byte(8, 0x7F);
        assert_eq!(patched.as_bytes()[8], 0x7F);
        assert_eq!(frame.as_bytes()[8], 0);
        // Out of range is ignored.
        assert_eq!(frame.with_byte(100, 1), frame);
    }

    #[test]
    fn test_code_on_short_frame() {
        assert_eq!(Frame::from_bytes(vec![0, 0]).code(), None);
    }
}
