// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Map cache.
//!
//! Symbols and connections follow the same lifecycle: a client proposes a
//! placeholder id, the server allocates the permanent one, tells the origin
//! about the rename and announces the element to everyone else. The shared
//! part lives in the generic `add`/`delete` helpers, the per-kind part in
//! [`MapElement`].

use super::collection::{IdCollection, Keyed};
use super::CacheError;
use crate::idmap::{IdMapping, IdMappingError};
use crate::model::{Connection, MapContents, MapId, Symbol};
use crate::protocol::{message, Frame};
use crate::router::SessionRouter;
use crate::session::{Session, SessionId};
use crate::store::MapStore;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, info, warn};

/// A cached map and the sessions viewing it.
#[derive(Debug, Default)]
pub struct CachedMap {
    symbols: IdCollection<Symbol>,
    connections: IdCollection<Connection>,
    subscribers: BTreeSet<SessionId>,
}

impl From<MapContents> for CachedMap {
    fn from(contents: MapContents) -> Self {
        Self {
            symbols: IdCollection::from_vec(contents.symbols),
            connections: IdCollection::from_vec(contents.connections),
            subscribers: BTreeSet::new(),
        }
    }
}

/// Per-kind behaviour of map elements.
pub trait MapElement: Keyed + Sized {
    /// Namespace name used in logs and errors.
    const NAMESPACE: &'static str;

    fn elements(map: &mut CachedMap) -> &mut IdCollection<Self>;

    /// The session's placeholder table for this kind.
    fn ids(session: &mut Session) -> &mut IdMapping;

    fn renamed(map: MapId, old: i32, new: i32) -> Frame;

    fn added(&self, map: MapId) -> Frame;

    fn deleted(map: MapId, id: i32) -> Frame;
}

impl MapElement for Symbol {
    const NAMESPACE: &'static str = "symbol";

    fn elements(map: &mut CachedMap) -> &mut IdCollection<Self> {
        &mut map.symbols
    }

    fn ids(session: &mut Session) -> &mut IdMapping {
        &mut session.symbol_ids
    }

    fn renamed(map: MapId, old: i32, new: i32) -> Frame {
        message::rename_symbol(map, old, new)
    }

    fn added(&self, map: MapId) -> Frame {
        message::add_symbol(map, self.id, self.x, self.y)
    }

    fn deleted(map: MapId, id: i32) -> Frame {
        message::delete_symbol(map, id)
    }
}

impl MapElement for Connection {
    const NAMESPACE: &'static str = "connection";

    fn elements(map: &mut CachedMap) -> &mut IdCollection<Self> {
        &mut map.connections
    }

    fn ids(session: &mut Session) -> &mut IdMapping {
        &mut session.connection_ids
    }

    fn renamed(map: MapId, old: i32, new: i32) -> Frame {
        message::rename_connection(map, old, new)
    }

    fn added(&self, map: MapId) -> Frame {
        message::add_connection(map, self.id, self.sym0, self.sym1)
    }

    fn deleted(map: MapId, id: i32) -> Frame {
        message::delete_connection(map, id)
    }
}

/// Open maps keyed by id.
#[derive(Debug, Default)]
pub struct MapCache {
    maps: HashMap<MapId, CachedMap>,
}

impl MapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `session` to `map`, loading it on first reference, and send
    /// the full contents.
    pub fn open(
        &mut self,
        router: &mut SessionRouter,
        store: &dyn MapStore,
        session: SessionId,
        map: MapId,
    ) -> Result<(), CacheError> {
        if map == 0 {
            return Err(CacheError::ReservedMap);
        }

        let cached = match self.maps.entry(map) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let contents = store
                    .load_map(map)
                    .map_err(|err| CacheError::MapLoad {
                        map,
                        reason: format!("{:#}", err),
                    })?
                    .ok_or(CacheError::MapNotFound(map))?;
                info!(
                    "Loaded map {} ({} symbols, {} connections)",
                    map,
                    contents.symbols.len(),
                    contents.connections.len()
                );
                e.insert(CachedMap::from(contents))
            }
        };

        cached.subscribers.insert(session);
        debug!(
            "{} opened map {} ({} subscribers)",
            session,
            map,
            cached.subscribers.len()
        );

        let snapshot = message::map_snapshot(
            map,
            cached.symbols.as_slice(),
            cached.connections.as_slice(),
        );
        router.send(session, snapshot);
        Ok(())
    }

    /// Unsubscribe `session`; the last one out writes the map back.
    pub fn close(
        &mut self,
        store: &dyn MapStore,
        session: SessionId,
        map: MapId,
    ) -> Result<(), CacheError> {
        let cached = self
            .maps
            .get_mut(&map)
            .ok_or(CacheError::MapNotOpen { map, session })?;
        if !cached.subscribers.remove(&session) {
            return Err(CacheError::MapNotOpen { map, session });
        }
        debug!("{} closed map {}", session, map);

        if cached.subscribers.is_empty() {
            self.write_back(store, map);
        }
        Ok(())
    }

    pub fn add_symbol(
        &mut self,
        router: &mut SessionRouter,
        origin: SessionId,
        map: MapId,
        temp_id: i32,
        x: i32,
        y: i32,
    ) -> Result<i32, CacheError> {
        self.add(router, origin, map, temp_id, |id| Symbol::placed(id, x, y))
    }

    /// `sym0`/`sym1` may still be placeholders of the origin session.
    pub fn add_connection(
        &mut self,
        router: &mut SessionRouter,
        origin: SessionId,
        map: MapId,
        temp_id: i32,
        sym0: i32,
        sym1: i32,
    ) -> Result<i32, CacheError> {
        let session = router
            .get(origin)
            .ok_or(CacheError::UnknownSession(origin))?;
        let sym0 = session.symbol_ids.resolve(sym0);
        let sym1 = session.symbol_ids.resolve(sym1);
        self.add(router, origin, map, temp_id, |id| Connection {
            id,
            sym0,
            sym1,
        })
    }

    pub fn delete_symbol(
        &mut self,
        router: &mut SessionRouter,
        origin: SessionId,
        map: MapId,
        id: i32,
    ) -> Result<i32, CacheError> {
        self.delete::<Symbol>(router, origin, map, id)
    }

    pub fn delete_connection(
        &mut self,
        router: &mut SessionRouter,
        origin: SessionId,
        map: MapId,
        id: i32,
    ) -> Result<i32, CacheError> {
        self.delete::<Connection>(router, origin, map, id)
    }

    /// Move a symbol by a relative offset.
    pub fn translate_symbol(
        &mut self,
        router: &mut SessionRouter,
        origin: SessionId,
        map: MapId,
        id: i32,
        dx: i32,
        dy: i32,
    ) -> Result<(), CacheError> {
        let resolved = router
            .get(origin)
            .ok_or(CacheError::UnknownSession(origin))?
            .symbol_ids
            .resolve(id);

        let cached = self.subscribed(origin, map)?;
        let symbol = cached
            .symbols
            .get_mut(resolved)
            .ok_or(CacheError::UnknownElement {
                map,
                namespace: Symbol::NAMESPACE,
                id: resolved,
            })?;
        symbol.x = symbol.x.wrapping_add(dx);
        symbol.y = symbol.y.wrapping_add(dy);

        let frame = message::translate_symbol(map, resolved, dx, dy);
        router.broadcast(&cached.subscribers, &frame, Some(origin));
        Ok(())
    }

    /// Drop every subscription of a departing session.
    pub fn release_session(&mut self, store: &dyn MapStore, session: SessionId) -> usize {
        let maps: Vec<MapId> = self
            .maps
            .iter()
            .filter(|(_, cached)| cached.subscribers.contains(&session))
            .map(|(id, _)| *id)
            .collect();

        for map in &maps {
            if let Err(e) = self.close(store, session, *map) {
                warn!("Releasing map {} for {}: {}", map, session, e);
            }
        }
        maps.len()
    }

    /// Write back and evict every cached map.
    pub fn flush_all(&mut self, store: &dyn MapStore) -> usize {
        let maps: Vec<MapId> = self.maps.keys().copied().collect();
        for map in &maps {
            self.write_back(store, *map);
        }
        maps.len()
    }

    pub fn is_cached(&self, map: MapId) -> bool {
        self.maps.contains_key(&map)
    }

    pub fn cached_count(&self) -> usize {
        self.maps.len()
    }

    pub fn subscriber_count(&self, map: MapId) -> usize {
        self.maps.get(&map).map_or(0, |m| m.subscribers.len())
    }

    pub fn symbols(&self, map: MapId) -> Option<&[Symbol]> {
        self.maps.get(&map).map(|m| m.symbols.as_slice())
    }

    pub fn connections(&self, map: MapId) -> Option<&[Connection]> {
        self.maps.get(&map).map(|m| m.connections.as_slice())
    }

    fn subscribed(&mut self, session: SessionId, map: MapId) -> Result<&mut CachedMap, CacheError> {
        self.maps
            .get_mut(&map)
            .filter(|cached| cached.subscribers.contains(&session))
            .ok_or(CacheError::MapNotOpen { map, session })
    }

    fn add<E: MapElement>(
        &mut self,
        router: &mut SessionRouter,
        origin: SessionId,
        map: MapId,
        temp_id: i32,
        build: impl FnOnce(i32) -> E,
    ) -> Result<i32, CacheError> {
        if temp_id >= 0 {
            return Err(IdMappingError::NotPlaceholder(temp_id).into());
        }
        if !router.contains(origin) {
            return Err(CacheError::UnknownSession(origin));
        }
        let cached = self.subscribed(origin, map)?;
        let new_id = E::elements(cached)
            .next_free_id()
            .ok_or(CacheError::IdsExhausted {
                map,
                namespace: E::NAMESPACE,
            })?;

        router.send(origin, E::renamed(map, temp_id, new_id));

        let element = build(new_id);
        let frame = element.added(map);
        E::elements(cached).push(element);
        router.broadcast(&cached.subscribers, &frame, Some(origin));

        // The element stays added even if the placeholder is already taken.
        if let Some(session) = router.get_mut(origin) {
            if let Err(e) = E::ids(session).insert(temp_id, new_id) {
                warn!("{}: {} mapping not recorded: {}", origin, E::NAMESPACE, e);
            }
        }

        debug!("map {}: {} {} -> {}", map, E::NAMESPACE, temp_id, new_id);
        Ok(new_id)
    }

    fn delete<E: MapElement>(
        &mut self,
        router: &mut SessionRouter,
        origin: SessionId,
        map: MapId,
        id: i32,
    ) -> Result<i32, CacheError> {
        let cached = self.subscribed(origin, map)?;

        let ids = E::ids(
            router
                .get_mut(origin)
                .ok_or(CacheError::UnknownSession(origin))?,
        );
        let resolved = ids.resolve(id);
        if !E::elements(cached).contains(resolved) {
            return Err(CacheError::UnknownElement {
                map,
                namespace: E::NAMESPACE,
                id: resolved,
            });
        }
        if resolved != id {
            ids.erase(id, resolved)?;
        }

        E::elements(cached).remove(resolved);
        router.broadcast(
            &cached.subscribers,
            &E::deleted(map, resolved),
            Some(origin),
        );

        debug!("map {}: deleted {} {}", map, E::NAMESPACE, resolved);
        Ok(resolved)
    }

    fn write_back(&mut self, store: &dyn MapStore, map: MapId) {
        let Some(cached) = self.maps.remove(&map) else {
            return;
        };
        match store.save_map(
            map,
            cached.symbols.as_slice(),
            cached.connections.as_slice(),
        ) {
            Ok(()) => info!("Saved map {}", map),
            Err(e) => error!("Failed to save map {}: {:#}", map, e),
        }
    }
}
