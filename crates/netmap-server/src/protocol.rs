// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary wire protocol.
//!
//! - [`codec`]: primitive encodings (u32, two's-complement i32, strings)
//! - [`frame`]: length-prefixed frames
//! - [`command`]: command codes and lock kinds
//! - [`message`]: request decoding and notification encoding

pub mod codec;
pub mod command;
pub mod frame;
pub mod message;

pub use codec::{decode_i32, encode_i32, WireError, WireReader, WireWriter};
pub use command::{Command, LockKind};
pub use frame::{
    peek_frame_header, Frame, FrameBuilder, ParseResult, DEFAULT_MAX_FRAME_SIZE,
    FRAME_HEADER_SIZE,
};
pub use message::{HolderView, Request, LOCK_KIND_OFFSET};
