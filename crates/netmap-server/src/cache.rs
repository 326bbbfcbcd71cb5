// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted caches of the shared aggregates.
//!
//! An aggregate is loaded from the store when its first subscriber opens
//! it and written back when the last one leaves. While cached, the copy
//! here is authoritative and every mutation is fanned out through the
//! [`SessionRouter`](crate::router::SessionRouter).

pub mod collection;
pub mod map;
pub mod node;

pub use collection::{IdCollection, Keyed};
pub use map::{MapCache, MapElement};
pub use node::{LockHolder, LockState, NodeCache};

use crate::idmap::IdMappingError;
use crate::model::{MapId, NodeId};
use crate::session::SessionId;
use thiserror::Error;

/// Request that could not be applied. The session stays connected and
/// nothing was mutated.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("map id 0 is reserved")]
    ReservedMap,

    #[error("map {0} does not exist")]
    MapNotFound(MapId),

    #[error("failed to load map {map}: {reason}")]
    MapLoad { map: MapId, reason: String },

    #[error("{session} has not opened map {map}")]
    MapNotOpen { map: MapId, session: SessionId },

    #[error("map {map} has no {namespace} {id}")]
    UnknownElement {
        map: MapId,
        namespace: &'static str,
        id: i32,
    },

    #[error("map {map} has no free {namespace} id")]
    IdsExhausted {
        map: MapId,
        namespace: &'static str,
    },

    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),

    #[error("failed to load node {node}: {reason}")]
    NodeLoad { node: NodeId, reason: String },

    #[error("{session} has not opened node {node}")]
    NodeNotOpen { node: NodeId, session: SessionId },

    #[error("node {node} is already locked by {holder}")]
    AlreadyLocked { node: NodeId, holder: SessionId },

    #[error("{session} does not hold the lock on node {node}")]
    NotLockHolder { node: NodeId, session: SessionId },

    #[error("{0} is not connected")]
    UnknownSession(SessionId),

    #[error(transparent)]
    IdMapping(#[from] IdMappingError),
}
