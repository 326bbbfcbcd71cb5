// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection session state.

use crate::idmap::IdMapping;
use crate::protocol::{peek_frame_header, Frame, ParseResult};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Engine-assigned session identifier, unique for the server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Framing violation that leaves the receive buffer unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("declared frame length {len} outside 8..={max}")]
    InvalidLength { len: usize, max: usize },
}

/// One connected client.
///
/// Holds the receive buffer for frame reassembly, the two placeholder
/// tables and the sending half of the outbound queue drained by the
/// connection task.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    host: String,
    login: String,
    inbound: Vec<u8>,
    outbound: mpsc::UnboundedSender<Frame>,
    pub symbol_ids: IdMapping,
    pub connection_ids: IdMapping,
}

impl Session {
    pub fn new(
        id: SessionId,
        host: impl Into<String>,
        outbound: mpsc::UnboundedSender<Frame>,
    ) -> Self {
        Self {
            id,
            host: host.into(),
            login: String::new(),
            inbound: Vec::with_capacity(4096),
            outbound,
            symbol_ids: IdMapping::new("symbol"),
            connection_ids: IdMapping::new("connection"),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer address the session connected from.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Login name, empty until LOGIN was received.
    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn set_login(&mut self, login: impl Into<String>) {
        self.login = login.into();
    }

    /// Append received bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed as frames.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }

    /// Take the next complete frame off the receive buffer.
    ///
    /// Returns `Ok(None)` when more input is needed. Exactly the declared
    /// length is consumed, whatever the handler later reads of it.
    pub fn next_frame(&mut self, max_frame_size: usize) -> Result<Option<Vec<u8>>, FramingError> {
        match peek_frame_header(&self.inbound, max_frame_size) {
            ParseResult::Incomplete(_) => Ok(None),
            ParseResult::Invalid(len) => Err(FramingError::InvalidLength {
                len,
                max: max_frame_size,
            }),
            ParseResult::Complete { len, .. } => {
                let frame: Vec<u8> = self.inbound.drain(..len).collect();
                Ok(Some(frame))
            }
        }
    }

    /// Queue a frame for the connection task. `false` once it is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.outbound.send(frame).is_ok()
    }
}
