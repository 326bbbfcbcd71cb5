// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session registry and frame fan-out.
//!
//! Every reply and broadcast goes through [`SessionRouter`]. A frame that
//! cannot be queued marks its session as failed; the dispatcher reaps failed
//! sessions after each event so teardown never happens in the middle of a
//! broadcast.

use crate::protocol::Frame;
use crate::session::{Session, SessionId};
use std::collections::HashMap;

/// Delivery statistics.
#[derive(Debug, Default, Clone)]
pub struct RouterStats {
    /// Frames queued to sessions.
    pub frames_sent: u64,
    /// Bytes queued to sessions.
    pub bytes_sent: u64,
    /// Frames that could not be queued (session gone or queue closed).
    pub failed_deliveries: u64,
}

/// Connected sessions indexed by id.
#[derive(Debug, Default)]
pub struct SessionRouter {
    sessions: HashMap<SessionId, Session>,
    failed: Vec<SessionId>,
    stats: RouterStats,
}

impl SessionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, session: Session) {
        self.sessions.insert(session.id(), session);
    }

    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        self.failed.retain(|f| *f != id);
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Queue `frame` to one session.
    ///
    /// Returns `false` if the session is unknown or its queue is closed.
    pub fn send(&mut self, id: SessionId, frame: Frame) -> bool {
        let len = frame.len() as u64;
        let delivered = self
            .sessions
            .get(&id)
            .map(|session| session.send(frame))
            .unwrap_or(false);

        if delivered {
            self.stats.frames_sent += 1;
            self.stats.bytes_sent += len;
        } else {
            self.stats.failed_deliveries += 1;
            if self.sessions.contains_key(&id) && !self.failed.contains(&id) {
                self.failed.push(id);
            }
        }
        delivered
    }

    /// Queue `frame` to every recipient except `exclude`, in iteration order.
    pub fn broadcast<'a>(
        &mut self,
        recipients: impl IntoIterator<Item = &'a SessionId>,
        frame: &Frame,
        exclude: Option<SessionId>,
    ) -> usize {
        let mut sent = 0;
        for id in recipients {
            if exclude != Some(*id) && self.send(*id, frame.clone()) {
                sent += 1;
            }
        }
        sent
    }

    /// Sessions whose outbound queue was found closed since the last call.
    pub fn take_failed(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.failed)
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}
