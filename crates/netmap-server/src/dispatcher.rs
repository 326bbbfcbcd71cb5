// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session command dispatcher.
//!
//! Owns every piece of shared state: the session router, both caches and
//! the store. It is driven by three inputs (connect, bytes received,
//! disconnect) and runs each request to completion, including its
//! broadcasts, before returning.

use crate::cache::{CacheError, MapCache, NodeCache};
use crate::protocol::{message, Command, Frame, Request, FRAME_HEADER_SIZE};
use crate::router::{RouterStats, SessionRouter};
use crate::session::{Session, SessionId};
use crate::store::MapStore;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Seconds since the Unix epoch, saturated to the wire width.
pub fn unix_now() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// Routes decoded requests to the caches.
pub struct Dispatcher<S: MapStore> {
    store: S,
    router: SessionRouter,
    maps: MapCache,
    nodes: NodeCache,
    max_frame_size: usize,
}

impl<S: MapStore> Dispatcher<S> {
    pub fn new(store: S, max_frame_size: usize) -> Self {
        Self {
            store,
            router: SessionRouter::new(),
            maps: MapCache::new(),
            nodes: NodeCache::new(),
            max_frame_size,
        }
    }

    /// Register a freshly accepted session.
    pub fn connect(
        &mut self,
        id: SessionId,
        host: impl Into<String>,
        outbound: mpsc::UnboundedSender<Frame>,
    ) {
        let session = Session::new(id, host, outbound);
        info!("{} connected from {}", id, session.host());
        self.router.register(session);
    }

    /// Feed received bytes and handle every frame they complete.
    pub fn receive(&mut self, id: SessionId, bytes: &[u8]) {
        let Some(session) = self.router.get_mut(id) else {
            debug!("Data for unknown {}, dropped", id);
            return;
        };
        session.push_bytes(bytes);

        loop {
            let next = match self.router.get_mut(id) {
                Some(session) => session.next_frame(self.max_frame_size),
                None => break,
            };
            match next {
                Ok(Some(frame)) => self.handle_frame(id, &frame),
                Ok(None) => break,
                Err(e) => {
                    warn!("{}: {}, closing session", id, e);
                    self.disconnect(id);
                    break;
                }
            }
        }

        self.reap_failed();
    }

    /// Tear a session down, releasing every map, node and lock it holds.
    pub fn disconnect(&mut self, id: SessionId) {
        if !self.router.contains(id) {
            return;
        }

        let maps = self.maps.release_session(&self.store, id);
        let nodes = self
            .nodes
            .release_session(&mut self.router, &self.store, id);
        self.router.unregister(id);
        info!(
            "{} disconnected (released {} maps, {} nodes)",
            id, maps, nodes
        );

        self.reap_failed();
    }

    /// Write back every cached aggregate. Sessions stay registered.
    pub fn shutdown(&mut self) {
        let maps = self.maps.flush_all(&self.store);
        let nodes = self.nodes.flush_all(&self.store);
        let stats = self.router.stats();
        info!(
            "Flushed {} maps and {} nodes; {} frames ({} bytes) sent, {} failed deliveries",
            maps, nodes, stats.frames_sent, stats.bytes_sent, stats.failed_deliveries
        );
    }

    pub fn session_count(&self) -> usize {
        self.router.session_count()
    }

    pub fn stats(&self) -> &RouterStats {
        self.router.stats()
    }

    pub fn maps(&self) -> &MapCache {
        &self.maps
    }

    pub fn nodes(&self) -> &NodeCache {
        &self.nodes
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.router.get(id)
    }

    fn reap_failed(&mut self) {
        loop {
            let failed = self.router.take_failed();
            if failed.is_empty() {
                break;
            }
            for id in failed {
                warn!("{}: outbound queue closed", id);
                self.disconnect(id);
            }
        }
    }

    fn handle_frame(&mut self, id: SessionId, frame: &[u8]) {
        let code = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let Some(command) = Command::from_code(code) else {
            warn!(
                "{}: unknown command {}, {} bytes discarded",
                id,
                code,
                frame.len()
            );
            return;
        };

        if frame.len() < command.min_frame_size() {
            warn!(
                "{}: {} frame of {} bytes, need at least {}",
                id,
                command,
                frame.len(),
                command.min_frame_size()
            );
            return;
        }

        let request = match Request::decode(command, frame) {
            Ok(request) => request,
            Err(e) => {
                warn!("{}: {} size error: {}", id, command, e);
                return;
            }
        };
        debug!(
            "{}: {} ({} payload bytes)",
            id,
            command,
            frame.len() - FRAME_HEADER_SIZE
        );

        if let Err(e) = self.apply(id, request) {
            warn!("{}: {} rejected: {}", id, command, e);
        }
    }

    fn apply(&mut self, id: SessionId, request: Request) -> Result<(), CacheError> {
        let store: &dyn MapStore = &self.store;
        let router = &mut self.router;

        match request {
            Request::Login { login, password: _ } => {
                let session = router.get_mut(id).ok_or(CacheError::UnknownSession(id))?;
                info!("{} logged in as {}", id, login);
                session.set_login(login);
            }
            Request::GetMapList => match store.list_maps() {
                Ok(mut maps) => {
                    // Map 0 is reserved and never listed.
                    maps.retain(|m| m.id != 0);
                    router.send(id, message::map_list(&maps));
                }
                Err(e) => error!("Failed to list maps: {:#}", e),
            },
            Request::OpenMap { map } => self.maps.open(router, store, id, map)?,
            Request::CloseMap { map } => self.maps.close(store, id, map)?,
            Request::AddSymbol {
                map,
                id: temp,
                x,
                y,
            } => {
                self.maps.add_symbol(router, id, map, temp, x, y)?;
            }
            Request::RenameSymbol { old, new, .. } => {
                let session = router.get_mut(id).ok_or(CacheError::UnknownSession(id))?;
                session.symbol_ids.erase(old, new)?;
            }
            Request::DeleteSymbol { map, id: symbol } => {
                self.maps.delete_symbol(router, id, map, symbol)?;
            }
            Request::TranslateSymbol {
                map,
                id: symbol,
                dx,
                dy,
            } => self.maps.translate_symbol(router, id, map, symbol, dx, dy)?,
            Request::AddConnection {
                map,
                id: temp,
                sym0,
                sym1,
            } => {
                self.maps.add_connection(router, id, map, temp, sym0, sym1)?;
            }
            Request::RenameConnection { old, new, .. } => {
                let session = router.get_mut(id).ok_or(CacheError::UnknownSession(id))?;
                session.connection_ids.erase(old, new)?;
            }
            Request::DeleteConnection { map, id: conn } => {
                self.maps.delete_connection(router, id, map, conn)?;
            }
            Request::OpenNode { node } => self.nodes.open(router, store, id, node)?,
            Request::CloseNode { node } => self.nodes.close(router, store, id, node)?,
            Request::SetNode { node, fields } => self.nodes.set_fields(router, id, node, fields)?,
            Request::LockNode { node } => self.nodes.lock(router, id, node, unix_now())?,
            Request::UnlockNode { node } => self.nodes.unlock(router, id, node)?,
            Request::Unsupported(command) => {
                warn!("{}: {} is not supported, discarded", id, command);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MapContents;
    use crate::protocol::{FrameBuilder, DEFAULT_MAX_FRAME_SIZE};
    use crate::store::MemoryStore;

    const A: SessionId = SessionId(1);

    fn dispatcher() -> (Dispatcher<MemoryStore>, mpsc::UnboundedReceiver<Frame>) {
        let store = MemoryStore::new();
        store.insert_map(1, "Backbone", MapContents::default());
        store.insert_map(7, "Office", MapContents::default());
        let mut d = Dispatcher::new(store, DEFAULT_MAX_FRAME_SIZE);
        let (tx, rx) = mpsc::unbounded_channel();
        d.connect(A, "127.0.0.1:40000", tx);
        (d, rx)
    }

    fn frame(command: Command, build: impl FnOnce(&mut FrameBuilder)) -> Vec<u8> {
        let mut b = FrameBuilder::new(command);
        build(&mut b);
        b.finish().into_bytes()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(f) = rx.try_recv() {
            frames.push(f);
        }
        frames
    }

    #[test]
    fn test_login_sets_identity() {
        let (mut d, _rx) = dispatcher();
        d.receive(
            A,
            &frame(Command::Login, |b| {
                b.put_string("alice").put_string("pw");
            }),
        );
        assert_eq!(d.session(A).unwrap().login(), "alice");
    }

    #[test]
    fn test_map_list() {
        let (mut d, mut rx) = dispatcher();
        d.receive(A, &frame(Command::GetMapList, |_| {}));

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let mut r = frames[0].payload();
        assert_eq!(r.get_u32().unwrap(), 2);
        assert_eq!(r.get_i32().unwrap(), 1);
        assert_eq!(r.get_string().unwrap(), "Backbone");
    }

    #[test]
    fn test_map_list_skips_reserved_map() {
        let (mut d, mut rx) = dispatcher();
        d.store().insert_map(0, "Root", MapContents::default());
        d.receive(A, &frame(Command::GetMapList, |_| {}));

        let frames = drain(&mut rx);
        let mut r = frames[0].payload();
        let count = r.get_u32().unwrap();
        let mut ids = Vec::new();
        for _ in 0..count {
            ids.push(r.get_i32().unwrap());
            r.get_string().unwrap();
        }
        assert_eq!(ids, vec![1, 7]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let (mut d, mut rx) = dispatcher();
        let bytes = frame(Command::OpenMap, |b| {
            b.put_i32(7);
        });
        for byte in &bytes {
            d.receive(A, std::slice::from_ref(byte));
        }
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(d.maps().is_cached(7));
    }

    #[test]
    fn test_unknown_command_is_skipped() {
        let (mut d, mut rx) = dispatcher();
        let mut bytes = vec![0, 0, 0, 12, 0, 0, 0, 99, 1, 2, 3, 4];
        bytes.extend(frame(Command::OpenMap, |b| {
            b.put_i32(7);
        }));
        d.receive(A, &bytes);

        assert_eq!(drain(&mut rx).len(), 1);
        assert!(d.maps().is_cached(7));
    }

    #[test]
    fn test_short_frame_is_dropped() {
        let (mut d, mut rx) = dispatcher();
        // OPEN_MAP without its map id.
        let mut bytes = frame(Command::OpenMap, |_| {});
        bytes.extend(frame(Command::GetMapList, |_| {}));
        d.receive(A, &bytes);

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), Some(Command::GetMapList));
        assert_eq!(d.maps().cached_count(), 0);
    }

    #[test]
    fn test_truncated_payload_is_dropped() {
        let (mut d, mut rx) = dispatcher();
        // Meets the minimum size but the login string overruns the frame.
        let bytes = frame(Command::Login, |b| {
            b.put_u32(100).put_u32(0);
        });
        d.receive(A, &bytes);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(d.session(A).unwrap().login(), "");
        assert_eq!(d.session_count(), 1);
    }

    #[test]
    fn test_degenerate_length_closes_session() {
        let (mut d, mut rx) = dispatcher();
        d.receive(
            A,
            &frame(Command::OpenMap, |b| {
                b.put_i32(7);
            }),
        );
        drain(&mut rx);

        d.receive(A, &[0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(d.session_count(), 0);
        assert!(!d.maps().is_cached(7));
        assert_eq!(d.store().map_save_count(7), 1);
    }

    #[test]
    fn test_oversized_frame_closes_session() {
        let store = MemoryStore::new();
        let mut d = Dispatcher::new(store, 64);
        let (tx, _rx) = mpsc::unbounded_channel();
        d.connect(A, "h", tx);

        d.receive(A, &[0, 0, 1, 0, 0, 0, 0, 1]);
        assert_eq!(d.session_count(), 0);
    }

    #[test]
    fn test_closed_outbound_queue_tears_down() {
        let (mut d, rx) = dispatcher();
        drop(rx);
        d.receive(
            A,
            &frame(Command::OpenMap, |b| {
                b.put_i32(7);
            }),
        );
        assert_eq!(d.session_count(), 0);
        assert!(!d.maps().is_cached(7));
        assert_eq!(d.stats().failed_deliveries, 1);
    }

    #[test]
    fn test_reserved_command_is_discarded() {
        let (mut d, mut rx) = dispatcher();
        d.receive(
            A,
            &frame(Command::DeleteMap, |b| {
                b.put_i32(1);
            }),
        );
        assert!(drain(&mut rx).is_empty());
        assert_eq!(d.session_count(), 1);
    }

    #[test]
    fn test_rename_ack_erases_mapping() {
        let (mut d, mut rx) = dispatcher();
        d.receive(
            A,
            &frame(Command::OpenMap, |b| {
                b.put_i32(7);
            }),
        );
        d.receive(
            A,
            &frame(Command::AddSymbol, |b| {
                b.put_i32(7).put_i32(-1).put_i32(0).put_i32(0);
            }),
        );
        drain(&mut rx);
        assert_eq!(d.session(A).unwrap().symbol_ids.len(), 1);

        d.receive(
            A,
            &frame(Command::RenameSymbol, |b| {
                b.put_i32(7).put_i32(-1).put_i32(1);
            }),
        );
        assert!(d.session(A).unwrap().symbol_ids.is_empty());
    }

    #[test]
    fn test_shutdown_flushes() {
        let (mut d, _rx) = dispatcher();
        d.receive(
            A,
            &frame(Command::OpenMap, |b| {
                b.put_i32(1);
            }),
        );
        d.shutdown();
        assert_eq!(d.maps().cached_count(), 0);
        assert_eq!(d.store().map_save_count(1), 1);
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2020-01-01
        assert!(unix_now() > 1_577_836_800);
    }
}
