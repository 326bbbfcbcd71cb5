// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request decoding and notification encoding.
//!
//! Requests are decoded from a complete frame into [`Request`]. Server
//! frames are produced by the free functions below, one per notification.

use super::codec::{WireError, WireReader, WireWriter};
use super::command::{Command, LockKind};
use super::frame::{Frame, FrameBuilder, FRAME_HEADER_SIZE};
use crate::model::{Connection, Interface, MapId, MapSummary, NodeFields, NodeId, Symbol};

/// Column width of the free-text node fields.
pub const TEXT_FIELD_CAPACITY: usize = 252;

/// Column width of the management address.
pub const MGMT_ADDRESS_CAPACITY: usize = 40;

/// Buffer size for login credentials.
pub const CREDENTIAL_CAPACITY: usize = 256;

/// Offset of the viewer-relative lock-kind byte in a LOCK_NODE frame.
pub const LOCK_KIND_OFFSET: usize = FRAME_HEADER_SIZE + 4;

/// Client-to-server request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login { login: String, password: String },
    GetMapList,
    OpenMap { map: MapId },
    CloseMap { map: MapId },
    AddSymbol { map: MapId, id: i32, x: i32, y: i32 },
    /// Client acknowledges a rename it was sent.
    RenameSymbol { map: MapId, old: i32, new: i32 },
    DeleteSymbol { map: MapId, id: i32 },
    TranslateSymbol {
        map: MapId,
        id: i32,
        dx: i32,
        dy: i32,
    },
    AddConnection {
        map: MapId,
        id: i32,
        sym0: i32,
        sym1: i32,
    },
    /// Client acknowledges a rename it was sent.
    RenameConnection { map: MapId, old: i32, new: i32 },
    DeleteConnection { map: MapId, id: i32 },
    OpenNode { node: NodeId },
    CloseNode { node: NodeId },
    SetNode { node: NodeId, fields: NodeFields },
    LockNode { node: NodeId },
    UnlockNode { node: NodeId },
    /// Known code the server does not act on.
    Unsupported(Command),
}

impl Request {
    /// Decode a complete frame (header included).
    pub fn decode(command: Command, frame: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::at(frame, FRAME_HEADER_SIZE);
        let request = match command {
            Command::Login => Self::Login {
                login: r.get_string_bounded(CREDENTIAL_CAPACITY)?,
                password: r.get_string_bounded(CREDENTIAL_CAPACITY)?,
            },
            Command::GetMapList => Self::GetMapList,
            Command::OpenMap => Self::OpenMap { map: r.get_i32()? },
            Command::CloseMap => Self::CloseMap { map: r.get_i32()? },
            Command::AddSymbol => Self::AddSymbol {
                map: r.get_i32()?,
                id: r.get_i32()?,
                x: r.get_i32()?,
                y: r.get_i32()?,
            },
            Command::RenameSymbol => Self::RenameSymbol {
                map: r.get_i32()?,
                old: r.get_i32()?,
                new: r.get_i32()?,
            },
            Command::DeleteSymbol => Self::DeleteSymbol {
                map: r.get_i32()?,
                id: r.get_i32()?,
            },
            Command::TranslateSymbol => Self::TranslateSymbol {
                map: r.get_i32()?,
                id: r.get_i32()?,
                dx: r.get_i32()?,
                dy: r.get_i32()?,
            },
            Command::AddConnection => Self::AddConnection {
                map: r.get_i32()?,
                id: r.get_i32()?,
                sym0: r.get_i32()?,
                sym1: r.get_i32()?,
            },
            Command::RenameConnection => Self::RenameConnection {
                map: r.get_i32()?,
                old: r.get_i32()?,
                new: r.get_i32()?,
            },
            Command::DeleteConnection => Self::DeleteConnection {
                map: r.get_i32()?,
                id: r.get_i32()?,
            },
            Command::OpenNode => Self::OpenNode { node: r.get_u32()? },
            Command::CloseNode => Self::CloseNode { node: r.get_u32()? },
            Command::SetNode => Self::SetNode {
                node: r.get_u32()?,
                fields: decode_fields(&mut r)?,
            },
            Command::LockNode => Self::LockNode { node: r.get_u32()? },
            Command::UnlockNode => Self::UnlockNode { node: r.get_u32()? },
            Command::AddMap
            | Command::RenameMap
            | Command::DeleteMap
            | Command::EditConnection
            | Command::AddNode
            | Command::DeleteNode
            | Command::UpdateNode => Self::Unsupported(command),
        };
        Ok(request)
    }
}

/// Append the descriptive node fields.
pub fn encode_fields(w: &mut WireWriter, fields: &NodeFields) {
    w.put_string(&fields.object_id)
        .put_string(&fields.name)
        .put_string(&fields.contact)
        .put_string(&fields.location)
        .put_string(&fields.description)
        .put_byte(u8::from(fields.ip_forwarding))
        .put_string(&fields.mgmt_address)
        .put_u32(fields.mgmt_flags)
        .put_u32(fields.topo_flags);
}

/// Read the descriptive node fields, truncated to their column widths.
pub fn decode_fields(r: &mut WireReader<'_>) -> Result<NodeFields, WireError> {
    Ok(NodeFields {
        object_id: r.get_string_bounded(TEXT_FIELD_CAPACITY)?,
        name: r.get_string_bounded(TEXT_FIELD_CAPACITY)?,
        contact: r.get_string_bounded(TEXT_FIELD_CAPACITY)?,
        location: r.get_string_bounded(TEXT_FIELD_CAPACITY)?,
        description: r.get_string_bounded(TEXT_FIELD_CAPACITY)?,
        ip_forwarding: r.get_byte()? != 0,
        mgmt_address: r.get_string_bounded(MGMT_ADDRESS_CAPACITY)?,
        mgmt_flags: r.get_u32()?,
        topo_flags: r.get_u32()?,
    })
}

fn encode_interface(w: &mut WireWriter, iface: &Interface) {
    w.put_u32(iface.id)
        .put_u32(iface.status)
        .put_u32(iface.flags)
        .put_string(&iface.ip_address)
        .put_u32(iface.if_index)
        .put_string(&iface.description)
        .put_u32(iface.if_type)
        .put_string(&iface.phys_address);
}

/// Read one interface record.
pub fn decode_interface(r: &mut WireReader<'_>) -> Result<Interface, WireError> {
    Ok(Interface {
        id: r.get_u32()?,
        status: r.get_u32()?,
        flags: r.get_u32()?,
        ip_address: r.get_string()?,
        if_index: r.get_u32()?,
        description: r.get_string()?,
        if_type: r.get_u32()?,
        phys_address: r.get_string()?,
    })
}

fn len_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub fn map_list(entries: &[MapSummary]) -> Frame {
    let mut b = FrameBuilder::new(Command::GetMapList);
    b.put_u32(len_u32(entries.len()));
    for entry in entries {
        b.put_i32(entry.id).put_string(&entry.name);
    }
    b.finish()
}

pub fn map_snapshot(map: MapId, symbols: &[Symbol], connections: &[Connection]) -> Frame {
    let mut b = FrameBuilder::new(Command::OpenMap);
    b.put_i32(map);

    b.put_u32(len_u32(symbols.len()));
    for s in symbols {
        b.put_i32(s.id)
            .put_i32(s.object_id)
            .put_i32(s.x)
            .put_i32(s.y)
            .put_string(&s.name)
            .put_string(&s.kind);
    }

    b.put_u32(len_u32(connections.len()));
    for c in connections {
        b.put_i32(c.id).put_i32(c.sym0).put_i32(c.sym1);
    }
    b.finish()
}

fn map_triple(command: Command, map: MapId, a: i32, c: i32) -> Frame {
    let mut b = FrameBuilder::new(command);
    b.put_i32(map).put_i32(a).put_i32(c);
    b.finish()
}

fn map_quad(command: Command, map: MapId, a: i32, c: i32, d: i32) -> Frame {
    let mut b = FrameBuilder::new(command);
    b.put_i32(map).put_i32(a).put_i32(c).put_i32(d);
    b.finish()
}

fn map_pair(command: Command, map: MapId, id: i32) -> Frame {
    let mut b = FrameBuilder::new(command);
    b.put_i32(map).put_i32(id);
    b.finish()
}

pub fn rename_symbol(map: MapId, old: i32, new: i32) -> Frame {
    map_triple(Command::RenameSymbol, map, old, new)
}

pub fn add_symbol(map: MapId, id: i32, x: i32, y: i32) -> Frame {
    map_quad(Command::AddSymbol, map, id, x, y)
}

pub fn delete_symbol(map: MapId, id: i32) -> Frame {
    map_pair(Command::DeleteSymbol, map, id)
}

pub fn translate_symbol(map: MapId, id: i32, dx: i32, dy: i32) -> Frame {
    map_quad(Command::TranslateSymbol, map, id, dx, dy)
}

pub fn rename_connection(map: MapId, old: i32, new: i32) -> Frame {
    map_triple(Command::RenameConnection, map, old, new)
}

pub fn add_connection(map: MapId, id: i32, sym0: i32, sym1: i32) -> Frame {
    map_quad(Command::AddConnection, map, id, sym0, sym1)
}

pub fn delete_connection(map: MapId, id: i32) -> Frame {
    map_pair(Command::DeleteConnection, map, id)
}

/// Identity of a lock holder as rendered on the wire.
#[derive(Debug, Clone, Copy)]
pub struct HolderView<'a> {
    pub login: &'a str,
    pub host: &'a str,
    pub since: u32,
}

/// OPEN_NODE reply for a record the store does not know.
pub fn node_not_found(node: NodeId) -> Frame {
    let mut b = FrameBuilder::new(Command::OpenNode);
    b.put_u32(node)
        .put_u32(u32::from(LockKind::NotFound.code()));
    b.finish()
}

/// OPEN_NODE reply carrying the full record.
pub fn node_snapshot(
    node: NodeId,
    kind: LockKind,
    holder: Option<HolderView<'_>>,
    fields: &NodeFields,
    interfaces: &[Interface],
) -> Frame {
    let mut b = FrameBuilder::new(Command::OpenNode);
    b.put_u32(node).put_u32(u32::from(kind.code()));
    if let (LockKind::LockedLocal | LockKind::LockedRemote, Some(h)) = (kind, holder) {
        b.put_string(h.login).put_string(h.host).put_u32(h.since);
    }
    encode_fields(&mut b, fields);
    b.put_u32(len_u32(interfaces.len()));
    for iface in interfaces {
        encode_interface(&mut b, iface);
    }
    b.finish()
}

pub fn update_node(node: NodeId, fields: &NodeFields) -> Frame {
    let mut b = FrameBuilder::new(Command::UpdateNode);
    b.put_u32(node);
    encode_fields(&mut b, fields);
    b.finish()
}

/// LOCK_NODE notification. The kind byte at [`LOCK_KIND_OFFSET`] is
/// rewritten per recipient.
pub fn lock_node(node: NodeId, kind: LockKind, holder: HolderView<'_>) -> Frame {
    let mut b = FrameBuilder::new(Command::LockNode);
    b.put_u32(node)
        .put_byte(kind.code())
        .put_string(holder.login)
        .put_string(holder.host)
        .put_u32(holder.since);
    b.finish()
}

pub fn unlock_node(node: NodeId) -> Frame {
    let mut b = FrameBuilder::new(Command::UnlockNode);
    b.put_u32(node);
    b.finish()
}
