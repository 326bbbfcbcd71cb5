// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node cache and the single-writer lock.
//!
//! ```text
//!            lock (subscriber)
//! Unlocked ---------------------> Locked(holder, since)
//!    ^                                  |
//!    +----------------------------------+
//!      unlock / close / disconnect by holder
//! ```
//!
//! Only the holder may change fields. Lock and unlock events go to every
//! subscriber, field updates to every subscriber but the holder.

use super::CacheError;
use crate::model::{NodeFields, NodeId, NodeRecord};
use crate::protocol::{message, HolderView, LockKind, LOCK_KIND_OFFSET};
use crate::router::SessionRouter;
use crate::session::SessionId;
use crate::store::MapStore;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, info, warn};

/// Session holding a node's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub session: SessionId,
    pub login: String,
    pub host: String,
    /// Acquisition time, seconds since the Unix epoch.
    pub since: u32,
}

impl LockHolder {
    fn view(&self) -> HolderView<'_> {
        HolderView {
            login: &self.login,
            host: &self.host,
            since: self.since,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LockState {
    #[default]
    Unlocked,
    Locked(LockHolder),
}

impl LockState {
    pub fn holder(&self) -> Option<&LockHolder> {
        match self {
            Self::Unlocked => None,
            Self::Locked(holder) => Some(holder),
        }
    }

    fn is_held_by(&self, session: SessionId) -> bool {
        self.holder().is_some_and(|h| h.session == session)
    }

    /// Lock kind as seen by `viewer`.
    pub fn kind_for(&self, viewer: SessionId) -> LockKind {
        match self.holder() {
            None => LockKind::Unlocked,
            Some(h) if h.session == viewer => LockKind::LockedLocal,
            Some(_) => LockKind::LockedRemote,
        }
    }
}

#[derive(Debug)]
struct CachedNode {
    record: NodeRecord,
    lock: LockState,
    subscribers: BTreeSet<SessionId>,
}

/// Open device records keyed by id.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<NodeId, CachedNode>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `session`, loading the record on first reference, and send
    /// it with the lock state as the session sees it.
    ///
    /// A record missing from the store is answered with `NOT_FOUND` and no
    /// subscription.
    pub fn open(
        &mut self,
        router: &mut SessionRouter,
        store: &dyn MapStore,
        session: SessionId,
        node: NodeId,
    ) -> Result<(), CacheError> {
        let cached = match self.nodes.entry(node) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let loaded = store.load_node(node).map_err(|err| CacheError::NodeLoad {
                    node,
                    reason: format!("{:#}", err),
                })?;
                let Some(record) = loaded else {
                    router.send(session, message::node_not_found(node));
                    return Err(CacheError::NodeNotFound(node));
                };
                info!(
                    "Loaded node {} ({} interfaces)",
                    node,
                    record.interfaces.len()
                );
                e.insert(CachedNode {
                    record,
                    lock: LockState::Unlocked,
                    subscribers: BTreeSet::new(),
                })
            }
        };

        cached.subscribers.insert(session);
        debug!("{} opened node {}", session, node);

        let frame = message::node_snapshot(
            node,
            cached.lock.kind_for(session),
            cached.lock.holder().map(LockHolder::view),
            &cached.record.fields,
            &cached.record.interfaces,
        );
        router.send(session, frame);
        Ok(())
    }

    /// Take the lock. Fails without any broadcast if it is already held.
    pub fn lock(
        &mut self,
        router: &mut SessionRouter,
        session: SessionId,
        node: NodeId,
        now: u32,
    ) -> Result<(), CacheError> {
        let cached = Self::subscribed(&mut self.nodes, session, node)?;
        if let Some(holder) = cached.lock.holder() {
            return Err(CacheError::AlreadyLocked {
                node,
                holder: holder.session,
            });
        }

        let s = router
            .get(session)
            .ok_or(CacheError::UnknownSession(session))?;
        let holder = LockHolder {
            session,
            login: s.login().to_string(),
            host: s.host().to_string(),
            since: now,
        };

        let frame = message::lock_node(node, LockKind::LockedRemote, holder.view());
        let local = frame.with_byte(LOCK_KIND_OFFSET, LockKind::LockedLocal.code());
        for &sub in &cached.subscribers {
            let f = if sub == session {
                local.clone()
            } else {
                frame.clone()
            };
            router.send(sub, f);
        }

        info!("{} locked node {}", session, node);
        cached.lock = LockState::Locked(holder);
        Ok(())
    }

    /// Replace the fields. Only the lock holder may do this.
    pub fn set_fields(
        &mut self,
        router: &mut SessionRouter,
        session: SessionId,
        node: NodeId,
        fields: NodeFields,
    ) -> Result<(), CacheError> {
        let cached = self
            .nodes
            .get_mut(&node)
            .filter(|c| c.lock.is_held_by(session))
            .ok_or(CacheError::NotLockHolder { node, session })?;

        cached.record.fields = fields;
        let frame = message::update_node(node, &cached.record.fields);
        router.broadcast(&cached.subscribers, &frame, Some(session));
        debug!("{} updated node {}", session, node);
        Ok(())
    }

    /// Release the lock. Only the holder may do this.
    pub fn unlock(
        &mut self,
        router: &mut SessionRouter,
        session: SessionId,
        node: NodeId,
    ) -> Result<(), CacheError> {
        let cached = self
            .nodes
            .get_mut(&node)
            .filter(|c| c.lock.is_held_by(session))
            .ok_or(CacheError::NotLockHolder { node, session })?;

        cached.lock = LockState::Unlocked;
        router.broadcast(&cached.subscribers, &message::unlock_node(node), None);
        info!("{} unlocked node {}", session, node);
        Ok(())
    }

    /// Unsubscribe `session`, releasing its lock first. The last one out
    /// writes the fields back.
    pub fn close(
        &mut self,
        router: &mut SessionRouter,
        store: &dyn MapStore,
        session: SessionId,
        node: NodeId,
    ) -> Result<(), CacheError> {
        Self::subscribed(&mut self.nodes, session, node)?;
        if let Err(e) = self.unlock(router, session, node) {
            debug!("close without lock: {}", e);
        }

        let Some(cached) = self.nodes.get_mut(&node) else {
            return Ok(());
        };
        cached.subscribers.remove(&session);
        debug!("{} closed node {}", session, node);

        if cached.subscribers.is_empty() {
            self.write_back(store, node);
        }
        Ok(())
    }

    /// Close every node a departing session has open.
    pub fn release_session(
        &mut self,
        router: &mut SessionRouter,
        store: &dyn MapStore,
        session: SessionId,
    ) -> usize {
        let nodes: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, cached)| cached.subscribers.contains(&session))
            .map(|(id, _)| *id)
            .collect();

        for node in &nodes {
            if let Err(e) = self.close(router, store, session, *node) {
                warn!("Releasing node {} for {}: {}", node, session, e);
            }
        }
        nodes.len()
    }

    /// Write back and evict every cached node.
    pub fn flush_all(&mut self, store: &dyn MapStore) -> usize {
        let nodes: Vec<NodeId> = self.nodes.keys().copied().collect();
        for node in &nodes {
            self.write_back(store, *node);
        }
        nodes.len()
    }

    pub fn is_cached(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn cached_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn subscriber_count(&self, node: NodeId) -> usize {
        self.nodes.get(&node).map_or(0, |n| n.subscribers.len())
    }

    pub fn lock_state(&self, node: NodeId) -> Option<&LockState> {
        self.nodes.get(&node).map(|n| &n.lock)
    }

    pub fn fields(&self, node: NodeId) -> Option<&NodeFields> {
        self.nodes.get(&node).map(|n| &n.record.fields)
    }

    fn subscribed(
        nodes: &mut HashMap<NodeId, CachedNode>,
        session: SessionId,
        node: NodeId,
    ) -> Result<&mut CachedNode, CacheError> {
        nodes
            .get_mut(&node)
            .filter(|cached| cached.subscribers.contains(&session))
            .ok_or(CacheError::NodeNotOpen { node, session })
    }

    fn write_back(&mut self, store: &dyn MapStore, node: NodeId) {
        let Some(cached) = self.nodes.remove(&node) else {
            return;
        };
        match store.save_node(node, &cached.record.fields) {
            Ok(()) => info!("Saved node {}", node),
            Err(e) => error!("Failed to save node {}: {:#}", node, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Interface;
    use crate::protocol::{Command, Frame};
    use crate::session::Session;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    const A: SessionId = SessionId(1);
    const B: SessionId = SessionId(2);

    struct Fixture {
        router: SessionRouter,
        store: MemoryStore,
        cache: NodeCache,
        rx_a: mpsc::UnboundedReceiver<Frame>,
        rx_b: mpsc::UnboundedReceiver<Frame>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut router = SessionRouter::new();
            let (tx_a, rx_a) = mpsc::unbounded_channel();
            let (tx_b, rx_b) = mpsc::unbounded_channel();
            let mut a = Session::new(A, "10.0.0.1:5000", tx_a);
            a.set_login("alice");
            let mut b = Session::new(B, "10.0.0.2:5000", tx_b);
            b.set_login("bob");
            router.register(a);
            router.register(b);

            let store = MemoryStore::new();
            store.insert_node(
                42,
                NodeRecord {
                    fields: NodeFields {
                        name: "core-sw1".into(),
                        ..Default::default()
                    },
                    interfaces: vec![Interface {
                        id: 1,
                        ..Default::default()
                    }],
                },
            );

            Self {
                router,
                store,
                cache: NodeCache::new(),
                rx_a,
                rx_b,
            }
        }

        fn open_both(&mut self) {
            self.cache
                .open(&mut self.router, &self.store, A, 42)
                .unwrap();
            self.cache
                .open(&mut self.router, &self.store, B, 42)
                .unwrap();
            drain(&mut self.rx_a);
            drain(&mut self.rx_b);
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(f) = rx.try_recv() {
            frames.push(f);
        }
        frames
    }

    fn lock_kind(frame: &Frame) -> u8 {
        frame.as_bytes()[LOCK_KIND_OFFSET]
    }

    #[test]
    fn test_open_missing_node() {
        let mut f = Fixture::new();
        assert!(matches!(
            f.cache.open(&mut f.router, &f.store, A, 7),
            Err(CacheError::NodeNotFound(7))
        ));
        assert_eq!(drain(&mut f.rx_a), vec![message::node_not_found(7)]);
        assert!(!f.cache.is_cached(7));
    }

    #[test]
    fn test_lock_is_viewer_relative() {
        let mut f = Fixture::new();
        f.open_both();

        f.cache.lock(&mut f.router, A, 42, 1000).unwrap();
        let to_a = drain(&mut f.rx_a);
        let to_b = drain(&mut f.rx_b);
        assert_eq!(to_a.len(), 1);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_a[0].command(), Some(Command::LockNode));
        assert_eq!(lock_kind(&to_a[0]), LockKind::LockedLocal.code());
        assert_eq!(lock_kind(&to_b[0]), LockKind::LockedRemote.code());

        let mut r = to_b[0].payload();
        assert_eq!(r.get_u32().unwrap(), 42);
        r.get_byte().unwrap();
        assert_eq!(r.get_string().unwrap(), "alice");
        assert_eq!(r.get_string().unwrap(), "10.0.0.1:5000");
        assert_eq!(r.get_u32().unwrap(), 1000);
    }

    #[test]
    fn test_second_lock_is_rejected_silently() {
        let mut f = Fixture::new();
        f.open_both();
        f.cache.lock(&mut f.router, A, 42, 1).unwrap();
        drain(&mut f.rx_a);
        drain(&mut f.rx_b);

        assert!(matches!(
            f.cache.lock(&mut f.router, B, 42, 2),
            Err(CacheError::AlreadyLocked { holder: A, .. })
        ));
        assert!(drain(&mut f.rx_a).is_empty());
        assert!(drain(&mut f.rx_b).is_empty());
        assert_eq!(f.cache.lock_state(42).unwrap().holder().unwrap().since, 1);
    }

    #[test]
    fn test_lock_requires_subscription() {
        let mut f = Fixture::new();
        f.cache.open(&mut f.router, &f.store, A, 42).unwrap();
        assert!(matches!(
            f.cache.lock(&mut f.router, B, 42, 0),
            Err(CacheError::NodeNotOpen { .. })
        ));
    }

    #[test]
    fn test_set_fields_by_holder_only() {
        let mut f = Fixture::new();
        f.open_both();

        let fields = NodeFields {
            name: "renamed".into(),
            ..Default::default()
        };
        assert!(matches!(
            f.cache.set_fields(&mut f.router, A, 42, fields.clone()),
            Err(CacheError::NotLockHolder { .. })
        ));

        f.cache.lock(&mut f.router, A, 42, 0).unwrap();
        drain(&mut f.rx_a);
        drain(&mut f.rx_b);

        f.cache
            .set_fields(&mut f.router, A, 42, fields.clone())
            .unwrap();
        assert!(drain(&mut f.rx_a).is_empty());
        assert_eq!(drain(&mut f.rx_b), vec![message::update_node(42, &fields)]);
        assert_eq!(f.cache.fields(42), Some(&fields));
    }

    #[test]
    fn test_unlock_by_non_holder_is_noop() {
        let mut f = Fixture::new();
        f.open_both();
        f.cache.lock(&mut f.router, A, 42, 0).unwrap();
        drain(&mut f.rx_b);

        assert!(f.cache.unlock(&mut f.router, B, 42).is_err());
        assert!(drain(&mut f.rx_b).is_empty());

        f.cache.unlock(&mut f.router, A, 42).unwrap();
        assert_eq!(f.cache.lock_state(42), Some(&LockState::Unlocked));
        assert_eq!(drain(&mut f.rx_b), vec![message::unlock_node(42)]);
    }

    #[test]
    fn test_open_while_locked_shows_holder() {
        let mut f = Fixture::new();
        f.cache.open(&mut f.router, &f.store, A, 42).unwrap();
        f.cache.lock(&mut f.router, A, 42, 77).unwrap();

        f.cache.open(&mut f.router, &f.store, B, 42).unwrap();
        let frames = drain(&mut f.rx_b);
        let mut r = frames[0].payload();
        assert_eq!(r.get_u32().unwrap(), 42);
        assert_eq!(
            r.get_u32().unwrap(),
            u32::from(LockKind::LockedRemote.code())
        );
        assert_eq!(r.get_string().unwrap(), "alice");
        assert_eq!(r.get_string().unwrap(), "10.0.0.1:5000");
        assert_eq!(r.get_u32().unwrap(), 77);
    }

    #[test]
    fn test_close_releases_lock_and_writes_back() {
        let mut f = Fixture::new();
        f.open_both();
        f.cache.lock(&mut f.router, A, 42, 0).unwrap();
        drain(&mut f.rx_b);

        f.cache.close(&mut f.router, &f.store, A, 42).unwrap();
        assert_eq!(drain(&mut f.rx_b), vec![message::unlock_node(42)]);
        assert!(f.cache.is_cached(42));
        assert_eq!(f.store.node_save_count(42), 0);

        f.cache.lock(&mut f.router, B, 42, 0).unwrap();
        f.cache.close(&mut f.router, &f.store, B, 42).unwrap();
        assert!(!f.cache.is_cached(42));
        assert_eq!(f.store.node_save_count(42), 1);
        assert_eq!(f.store.node(42).unwrap().interfaces.len(), 1);
    }

    #[test]
    fn test_release_session() {
        let mut f = Fixture::new();
        f.cache.open(&mut f.router, &f.store, A, 42).unwrap();
        f.cache.lock(&mut f.router, A, 42, 0).unwrap();

        assert_eq!(f.cache.release_session(&mut f.router, &f.store, A), 1);
        assert_eq!(f.cache.cached_count(), 0);
        assert_eq!(f.store.node_save_count(42), 1);
    }

    #[test]
    fn test_flush_all() {
        let mut f = Fixture::new();
        f.open_both();
        assert_eq!(f.cache.flush_all(&f.store), 1);
        assert!(!f.cache.is_cached(42));
        assert_eq!(f.store.node_save_count(42), 1);
    }
}
