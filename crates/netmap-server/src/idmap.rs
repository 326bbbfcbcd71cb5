// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Placeholder-to-permanent id reconciliation.
//!
//! A client creating a symbol or connection picks a negative placeholder id
//! and keeps using it until it has applied the server's rename. Each session
//! keeps one table per namespace so later requests that still carry the
//! placeholder resolve to the permanent id.

use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Reconciliation misuse. Never fatal to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdMappingError {
    #[error("placeholder {0} is not negative")]
    NotPlaceholder(i32),
    #[error("placeholder {old} already mapped to {existing}")]
    AlreadyMapped { old: i32, existing: i32 },
    #[error("placeholder {0} is not mapped")]
    Unmapped(i32),
    #[error("placeholder {old} maps to {actual}, not {expected}")]
    Mismatch {
        old: i32,
        expected: i32,
        actual: i32,
    },
}

/// One namespace of placeholder mappings.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    namespace: &'static str,
    entries: HashMap<i32, i32>,
}

impl IdMapping {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            entries: HashMap::new(),
        }
    }

    /// Record `old -> new`.
    pub fn insert(&mut self, old: i32, new: i32) -> Result<(), IdMappingError> {
        if old >= 0 {
            return Err(IdMappingError::NotPlaceholder(old));
        }
        if let Some(&existing) = self.entries.get(&old) {
            return Err(IdMappingError::AlreadyMapped { old, existing });
        }
        self.entries.insert(old, new);
        Ok(())
    }

    /// Drop `old -> new` once the client has applied the rename.
    pub fn erase(&mut self, old: i32, new: i32) -> Result<(), IdMappingError> {
        match self.entries.get(&old) {
            None => Err(IdMappingError::Unmapped(old)),
            Some(&actual) if actual != new => Err(IdMappingError::Mismatch {
                old,
                expected: new,
                actual,
            }),
            Some(_) => {
                self.entries.remove(&old);
                Ok(())
            }
        }
    }

    /// Translate `old`. Permanent ids pass through; unknown placeholders are
    /// returned unchanged.
    pub fn resolve(&self, old: i32) -> i32 {
        if old >= 0 {
            return old;
        }
        match self.entries.get(&old) {
            Some(&new) => new,
            None => {
                warn!("[{}] unresolved placeholder id {}", self.namespace, old);
                old
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }
}
