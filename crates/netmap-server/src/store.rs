// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistent store boundary
//!
//! The caches only ever load an aggregate on first reference and save it
//! when the last subscriber leaves. Everything else stays in memory.
//!
//! # Implementations
//!
//! - [`SqliteStore`] -- default backend, used by the binary
//! - [`MemoryStore`] -- in-process maps, used by tests

use crate::model::{
    Connection, MapContents, MapId, MapSummary, NodeFields, NodeId, NodeRecord, Symbol,
};
use anyhow::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Load/save boundary for maps and device records.
pub trait MapStore: Send {
    /// All maps, ordered by id.
    fn list_maps(&self) -> Result<Vec<MapSummary>>;

    /// Symbols and connections of a map, `None` if the map does not exist.
    fn load_map(&self, map: MapId) -> Result<Option<MapContents>>;

    /// Replace the persisted symbols and connections of a map.
    fn save_map(&self, map: MapId, symbols: &[Symbol], connections: &[Connection]) -> Result<()>;

    /// Fields and interfaces of a device, `None` if it does not exist.
    fn load_node(&self, node: NodeId) -> Result<Option<NodeRecord>>;

    /// Write back the descriptive fields. Interfaces are never written.
    fn save_node(&self, node: NodeId, fields: &NodeFields) -> Result<()>;
}
