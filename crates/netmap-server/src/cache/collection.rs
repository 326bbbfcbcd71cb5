// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered collection of elements keyed by a per-map id.

use crate::model::{Connection, Symbol};
use std::collections::HashSet;

/// Element carrying its own id.
pub trait Keyed {
    fn key(&self) -> i32;
}

impl Keyed for Symbol {
    fn key(&self) -> i32 {
        self.id
    }
}

impl Keyed for Connection {
    fn key(&self) -> i32 {
        self.id
    }
}

/// Insertion-ordered elements with unique ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCollection<T> {
    items: Vec<T>,
}

impl<T> Default for IdCollection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> IdCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Smallest positive id not in use, `None` once every id is taken.
    pub fn next_free_id(&self) -> Option<i32> {
        let used: HashSet<i32> = self.items.iter().map(Keyed::key).collect();
        first_free(&used, i32::MAX)
    }

    pub fn get(&self, id: i32) -> Option<&T> {
        self.items.iter().find(|item| item.key() == id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.key() == id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.get(id).is_some()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Remove by id, keeping the order of the rest.
    pub fn remove(&mut self, id: i32) -> Option<T> {
        let pos = self.items.iter().position(|item| item.key() == id)?;
        Some(self.items.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

fn first_free(used: &HashSet<i32>, max: i32) -> Option<i32> {
    (1..=max).find(|id| !used.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: i32) -> Connection {
        Connection {
            id,
            sym0: 0,
            sym1: 0,
        }
    }

    #[test]
    fn test_next_free_id_starts_at_one() {
        let c: IdCollection<Connection> = IdCollection::new();
        assert_eq!(c.next_free_id(), Some(1));
    }

    #[test]
    fn test_next_free_id_fills_gaps() {
        let c = IdCollection::from_vec(vec![conn(1), conn(2), conn(4)]);
        assert_eq!(c.next_free_id(), Some(3));

        let c = IdCollection::from_vec(vec![conn(2), conn(3)]);
        assert_eq!(c.next_free_id(), Some(1));

        // Stray non-positive ids from the store do not count.
        let c = IdCollection::from_vec(vec![conn(0), conn(-4), conn(1)]);
        assert_eq!(c.next_free_id(), Some(2));
    }

    #[test]
    fn test_exhausted_id_space() {
        let used: HashSet<i32> = [1, 2, 3].into_iter().collect();
        assert_eq!(first_free(&used, 3), None);
        assert_eq!(first_free(&used, 4), Some(4));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut c = IdCollection::from_vec(vec![conn(5), conn(1), conn(3)]);
        assert_eq!(c.remove(1), Some(conn(1)));
        assert_eq!(c.remove(1), None);
        let ids: Vec<i32> = c.as_slice().iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![5, 3]);
    }

    #[test]
    fn test_get_mut() {
        let mut c = IdCollection::from_vec(vec![Symbol::placed(1, 0, 0)]);
        c.get_mut(1).unwrap().x = 9;
        assert_eq!(c.get(1).unwrap().x, 9);
        assert!(!c.contains(2));
        assert_eq!(c.len(), 1);
    }
}
