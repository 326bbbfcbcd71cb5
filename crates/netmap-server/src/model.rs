// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Map and node records shared by the caches, the wire layer and the store.

/// Map identifier. `0` is reserved and never handed to clients.
pub type MapId = i32;

/// Device record identifier.
pub type NodeId = u32;

/// Type tag of symbols that open another map.
pub const SUBMAP_KIND: &str = "Map:Submap";

/// Display name given to symbols created by a client.
pub const NEW_SYMBOL_NAME: &str = "unnamed";

/// Type tag given to symbols created by a client.
pub const NEW_SYMBOL_KIND: &str = "unknown";

/// Entry of the map list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSummary {
    pub id: MapId,
    pub name: String,
}

/// A symbol placed on a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Permanent id, unique within the map.
    pub id: i32,
    /// Referenced node id, or map id for submap symbols.
    pub object_id: i32,
    pub x: i32,
    pub y: i32,
    pub name: String,
    /// Free-form type tag (device class, or [`SUBMAP_KIND`]).
    pub kind: String,
}

impl Symbol {
    /// A symbol created interactively: no object yet, placeholder labels.
    pub fn placed(id: i32, x: i32, y: i32) -> Self {
        Self {
            id,
            object_id: 0,
            x,
            y,
            name: NEW_SYMBOL_NAME.to_string(),
            kind: NEW_SYMBOL_KIND.to_string(),
        }
    }

    pub fn is_submap(&self) -> bool {
        self.kind == SUBMAP_KIND
    }
}

/// A link between two symbols of the same map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: i32,
    pub sym0: i32,
    pub sym1: i32,
}

/// Persisted contents of one map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapContents {
    pub symbols: Vec<Symbol>,
    pub connections: Vec<Connection>,
}

/// Editable descriptive fields of a device record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFields {
    pub object_id: String,
    pub name: String,
    pub contact: String,
    pub location: String,
    pub description: String,
    pub ip_forwarding: bool,
    pub mgmt_address: String,
    pub mgmt_flags: u32,
    pub topo_flags: u32,
}

/// One network interface of a device. Read-only for clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    pub id: u32,
    pub status: u32,
    pub flags: u32,
    pub ip_address: String,
    pub if_index: u32,
    pub description: String,
    pub if_type: u32,
    pub phys_address: String,
}

/// Persisted contents of one device record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub fields: NodeFields,
    pub interfaces: Vec<Interface>,
}
