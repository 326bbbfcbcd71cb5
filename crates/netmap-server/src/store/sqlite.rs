// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite store
//!
//! Thread-safe via internal Mutex (SQLite Connection is not Sync).
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE map (map_id INTEGER PRIMARY KEY, name TEXT NOT NULL);
//! CREATE TABLE symbol (
//!     map_id INTEGER NOT NULL,
//!     symbol_id INTEGER NOT NULL,
//!     id INTEGER NOT NULL,          -- node id, or map id when submap = 1
//!     xpos INTEGER NOT NULL,
//!     ypos INTEGER NOT NULL,
//!     submap INTEGER NOT NULL DEFAULT 0,
//!     PRIMARY KEY (map_id, symbol_id)
//! );
//! CREATE TABLE conn (map_id, conn_id, id0, id1, PRIMARY KEY (map_id, conn_id));
//! CREATE TABLE node (node_id INTEGER PRIMARY KEY, object_id, name, contact, ...);
//! CREATE TABLE interface (node_id, interface_id, status, flags, ...);
//! CREATE TABLE icon (object_id TEXT PRIMARY KEY, name TEXT NOT NULL);
//! ```
//!
//! Symbol labels are not stored. A node symbol shows the node's name and
//! the icon registered for its object identity; a submap symbol shows the
//! referenced map's name.

use crate::model::{
    Connection, Interface, MapContents, MapId, MapSummary, NodeFields, NodeId, NodeRecord, Symbol,
    NEW_SYMBOL_KIND, NEW_SYMBOL_NAME, SUBMAP_KIND,
};
use crate::store::MapStore;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// Database path selecting a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS map (
        map_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS symbol (
        map_id INTEGER NOT NULL,
        symbol_id INTEGER NOT NULL,
        id INTEGER NOT NULL,
        xpos INTEGER NOT NULL,
        ypos INTEGER NOT NULL,
        submap INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (map_id, symbol_id)
    );
    CREATE TABLE IF NOT EXISTS conn (
        map_id INTEGER NOT NULL,
        conn_id INTEGER NOT NULL,
        id0 INTEGER NOT NULL,
        id1 INTEGER NOT NULL,
        PRIMARY KEY (map_id, conn_id)
    );
    CREATE TABLE IF NOT EXISTS node (
        node_id INTEGER PRIMARY KEY,
        object_id TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL DEFAULT '',
        contact TEXT NOT NULL DEFAULT '',
        location TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        ip_forwarding INTEGER NOT NULL DEFAULT 0,
        mgmt_address TEXT NOT NULL DEFAULT '',
        mgmt_flags INTEGER NOT NULL DEFAULT 0,
        topo_flags INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS interface (
        node_id INTEGER NOT NULL,
        interface_id INTEGER NOT NULL,
        status INTEGER NOT NULL DEFAULT 0,
        flags INTEGER NOT NULL DEFAULT 0,
        ip_address TEXT NOT NULL DEFAULT '',
        if_index INTEGER NOT NULL DEFAULT 0,
        description TEXT NOT NULL DEFAULT '',
        if_type INTEGER NOT NULL DEFAULT 0,
        phys_address TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (node_id, interface_id)
    );
    CREATE TABLE IF NOT EXISTS icon (
        object_id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );
";

/// SQLite-backed [`MapStore`].
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) a file database. [`IN_MEMORY_PATH`] opens a private
    /// in-memory one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == IN_MEMORY_PATH {
            return Self::new_in_memory();
        }
        let conn = rusqlite::Connection::open(path)
            .with_context(|| {
                format!("Failed to open SQLite database at {}", path.display())
            })?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .context("Failed to create in-memory SQLite database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create or rename a map.
    pub fn insert_map(&self, id: MapId, name: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO map (map_id, name) VALUES (?1, ?2)
             ON CONFLICT(map_id) DO UPDATE SET name = excluded.name",
            params![id, name],
        )?;
        Ok(())
    }

    /// Create or replace a device record with its interfaces.
    pub fn insert_node(&self, id: NodeId, record: &NodeRecord) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let f = &record.fields;
        tx.execute(
            "INSERT OR REPLACE INTO node (node_id, object_id, name, contact, location,
                 description, ip_forwarding, mgmt_address, mgmt_flags, topo_flags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                f.object_id,
                f.name,
                f.contact,
                f.location,
                f.description,
                f.ip_forwarding,
                f.mgmt_address,
                f.mgmt_flags,
                f.topo_flags,
            ],
        )?;
        tx.execute("DELETE FROM interface WHERE node_id = ?1", [id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO interface (node_id, interface_id, status, flags, ip_address,
                     if_index, description, if_type, phys_address)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for i in &record.interfaces {
                stmt.execute(params![
                    id,
                    i.id,
                    i.status,
                    i.flags,
                    i.ip_address,
                    i.if_index,
                    i.description,
                    i.if_type,
                    i.phys_address,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Register the icon shown for devices with the given object identity.
    pub fn insert_icon(&self, object_id: &str, name: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO icon (object_id, name) VALUES (?1, ?2)",
            params![object_id, name],
        )?;
        Ok(())
    }

    fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
        let submap: bool = row.get(4)?;
        let name: Option<String> = row.get(5)?;
        let icon: Option<String> = row.get(6)?;
        let kind = if submap {
            SUBMAP_KIND.to_string()
        } else {
            icon.unwrap_or_else(|| NEW_SYMBOL_KIND.to_string())
        };

        Ok(Symbol {
            id: row.get(0)?,
            object_id: row.get(1)?,
            x: row.get(2)?,
            y: row.get(3)?,
            name: name.unwrap_or_else(|| NEW_SYMBOL_NAME.to_string()),
            kind,
        })
    }

    fn row_to_interface(row: &rusqlite::Row) -> rusqlite::Result<Interface> {
        Ok(Interface {
            id: row.get(0)?,
            status: row.get(1)?,
            flags: row.get(2)?,
            ip_address: row.get(3)?,
            if_index: row.get(4)?,
            description: row.get(5)?,
            if_type: row.get(6)?,
            phys_address: row.get(7)?,
        })
    }
}

impl MapStore for SqliteStore {
    fn list_maps(&self) -> Result<Vec<MapSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT map_id, name FROM map ORDER BY map_id")?;
        let maps = stmt
            .query_map([], |row| {
                Ok(MapSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(maps)
    }

    fn load_map(&self, map: MapId) -> Result<Option<MapContents>> {
        let conn = self.conn.lock();

        let exists = conn
            .query_row("SELECT 1 FROM map WHERE map_id = ?1", [map], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT s.symbol_id, s.id, s.xpos, s.ypos, s.submap,
                    CASE WHEN s.submap THEN m.name ELSE n.name END,
                    i.name
             FROM symbol s
             LEFT JOIN map m ON s.submap AND m.map_id = s.id
             LEFT JOIN node n ON NOT s.submap AND n.node_id = s.id
             LEFT JOIN icon i ON i.object_id = n.object_id
             WHERE s.map_id = ?1
             ORDER BY s.symbol_id",
        )?;
        let symbols = stmt
            .query_map([map], Self::row_to_symbol)?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to load symbols of map {}", map))?;

        let mut stmt = conn.prepare(
            "SELECT conn_id, id0, id1 FROM conn WHERE map_id = ?1 ORDER BY conn_id",
        )?;
        let connections = stmt
            .query_map([map], |row| {
                Ok(Connection {
                    id: row.get(0)?,
                    sym0: row.get(1)?,
                    sym1: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to load connections of map {}", map))?;

        debug!(
            "Loaded map {}: {} symbols, {} connections",
            map,
            symbols.len(),
            connections.len()
        );
        Ok(Some(MapContents {
            symbols,
            connections,
        }))
    }

    fn save_map(&self, map: MapId, symbols: &[Symbol], connections: &[Connection]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM conn WHERE map_id = ?1", [map])?;
        tx.execute("DELETE FROM symbol WHERE map_id = ?1", [map])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO symbol (map_id, symbol_id, id, xpos, ypos, submap)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for s in symbols {
                stmt.execute(params![map, s.id, s.object_id, s.x, s.y, s.is_submap()])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO conn (map_id, conn_id, id0, id1) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for c in connections {
                stmt.execute(params![map, c.id, c.sym0, c.sym1])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit map {}", map))?;
        Ok(())
    }

    fn load_node(&self, node: NodeId) -> Result<Option<NodeRecord>> {
        let conn = self.conn.lock();

        let fields = conn
            .query_row(
                "SELECT object_id, name, contact, location, description, ip_forwarding,
                        mgmt_address, mgmt_flags, topo_flags
                 FROM node WHERE node_id = ?1",
                [node],
                |row| {
                    Ok(NodeFields {
                        object_id: row.get(0)?,
                        name: row.get(1)?,
                        contact: row.get(2)?,
                        location: row.get(3)?,
                        description: row.get(4)?,
                        ip_forwarding: row.get(5)?,
                        mgmt_address: row.get(6)?,
                        mgmt_flags: row.get(7)?,
                        topo_flags: row.get(8)?,
                    })
                },
            )
            .optional()?;
        let Some(fields) = fields else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT interface_id, status, flags, ip_address, if_index, description,
                    if_type, phys_address
             FROM interface WHERE node_id = ?1 ORDER BY if_index",
        )?;
        let interfaces = stmt
            .query_map([node], Self::row_to_interface)?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to load interfaces of node {}", node))?;

        Ok(Some(NodeRecord { fields, interfaces }))
    }

    fn save_node(&self, node: NodeId, fields: &NodeFields) -> Result<()> {
        let updated = self.conn.lock().execute(
            "UPDATE node
             SET object_id = ?2, name = ?3, contact = ?4, location = ?5, description = ?6,
                 ip_forwarding = ?7, mgmt_address = ?8, mgmt_flags = ?9, topo_flags = ?10
             WHERE node_id = ?1",
            params![
                node,
                fields.object_id,
                fields.name,
                fields.contact,
                fields.location,
                fields.description,
                fields.ip_forwarding,
                fields.mgmt_address,
                fields.mgmt_flags,
                fields.topo_flags,
            ],
        )?;
        if updated == 0 {
            anyhow::bail!("node {} does not exist", node);
        }
        Ok(())
    }
}
