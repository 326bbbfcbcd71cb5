// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory store.

use crate::model::{
    Connection, MapContents, MapId, MapSummary, NodeFields, NodeId, NodeRecord, Symbol,
};
use crate::store::MapStore;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Inner {
    maps: BTreeMap<MapId, (String, MapContents)>,
    nodes: BTreeMap<NodeId, NodeRecord>,
    map_saves: HashMap<MapId, usize>,
    node_saves: HashMap<NodeId, usize>,
    fail_saves: bool,
}

/// Store backed by ordered maps. Counts every save so tests can assert
/// write-back happened exactly once.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_map(&self, id: MapId, name: impl Into<String>, contents: MapContents) {
        self.inner.lock().maps.insert(id, (name.into(), contents));
    }

    pub fn insert_node(&self, id: NodeId, record: NodeRecord) {
        self.inner.lock().nodes.insert(id, record);
    }

    /// Currently persisted contents of a map.
    pub fn map(&self, id: MapId) -> Option<MapContents> {
        self.inner.lock().maps.get(&id).map(|(_, c)| c.clone())
    }

    /// Currently persisted record of a node.
    pub fn node(&self, id: NodeId) -> Option<NodeRecord> {
        self.inner.lock().nodes.get(&id).cloned()
    }

    pub fn map_save_count(&self, id: MapId) -> usize {
        self.inner.lock().map_saves.get(&id).copied().unwrap_or(0)
    }

    pub fn node_save_count(&self, id: NodeId) -> usize {
        self.inner.lock().node_saves.get(&id).copied().unwrap_or(0)
    }

    /// Make every subsequent save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.inner.lock().fail_saves = fail;
    }
}

impl MapStore for MemoryStore {
    fn list_maps(&self) -> Result<Vec<MapSummary>> {
        Ok(self
            .inner
            .lock()
            .maps
            .iter()
            .map(|(id, (name, _))| MapSummary {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    fn load_map(&self, map: MapId) -> Result<Option<MapContents>> {
        Ok(self.map(map))
    }

    fn save_map(&self, map: MapId, symbols: &[Symbol], connections: &[Connection]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_saves {
            bail!("save of map {} rejected", map);
        }
        *inner.map_saves.entry(map).or_default() += 1;
        let entry = inner
            .maps
            .entry(map)
            .or_insert_with(|| (String::new(), MapContents::default()));
        entry.1 = MapContents {
            symbols: symbols.to_vec(),
            connections: connections.to_vec(),
        };
        Ok(())
    }

    fn load_node(&self, node: NodeId) -> Result<Option<NodeRecord>> {
        Ok(self.node(node))
    }

    fn save_node(&self, node: NodeId, fields: &NodeFields) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_saves {
            bail!("save of node {} rejected", node);
        }
        *inner.node_saves.entry(node).or_default() += 1;
        inner.nodes.entry(node).or_default().fields = fields.clone();
        Ok(())
    }
}
