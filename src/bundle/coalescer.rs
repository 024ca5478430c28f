//! At most one in-flight load per key
//!
//! Requests for a key that is already loading subscribe to the existing
//! operation instead of starting another one. Subscribers are kept in the
//! order they arrived and are handed back together when the operation
//! completes.

use std::collections::HashMap;
use std::hash::Hash;

use crate::bundle::worker::OpId;

/// An outstanding load and everything waiting on it
pub struct InFlight<C, M> {
    pub op: OpId,
    pub subscribers: Vec<C>,
    /// Extra state accumulated while loading (referrers, for bundles)
    pub meta: M,
}

/// Tracks in-flight loads by key
pub struct LoadCoalescer<K, C, M = ()> {
    by_key: HashMap<K, InFlight<C, M>>,
    by_op: HashMap<OpId, K>,
}

impl<K, C, M> LoadCoalescer<K, C, M>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            by_op: HashMap::new(),
        }
    }

    pub fn is_loading(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Operation currently loading `key`
    pub fn op_of(&self, key: &K) -> Option<OpId> {
        self.by_key.get(key).map(|flight| flight.op)
    }

    /// Record a freshly started load for `key`
    ///
    /// Returns `false` and leaves the existing record untouched when `key` is
    /// already loading.
    pub fn start(&mut self, key: K, op: OpId, meta: M) -> bool {
        if self.by_key.contains_key(&key) {
            return false;
        }
        self.by_op.insert(op, key.clone());
        self.by_key.insert(
            key,
            InFlight {
                op,
                subscribers: Vec::new(),
                meta,
            },
        );
        true
    }

    /// Append a subscriber to `key`'s load
    ///
    /// Gives the subscriber back when nothing is loading `key`.
    pub fn subscribe(&mut self, key: &K, subscriber: C) -> Result<(), C> {
        match self.by_key.get_mut(key) {
            Some(flight) => {
                flight.subscribers.push(subscriber);
                Ok(())
            }
            None => Err(subscriber),
        }
    }

    pub fn meta(&self, key: &K) -> Option<&M> {
        self.by_key.get(key).map(|flight| &flight.meta)
    }

    pub fn meta_mut(&mut self, key: &K) -> Option<&mut M> {
        self.by_key.get_mut(key).map(|flight| &mut flight.meta)
    }

    /// Remove the record owned by `op`
    pub fn complete(&mut self, op: OpId) -> Option<(K, InFlight<C, M>)> {
        let key = self.by_op.remove(&op)?;
        let flight = self.by_key.remove(&key)?;
        Some((key, flight))
    }

    /// Snapshot of loading keys matching `filter`
    pub fn keys_where(&self, mut filter: impl FnMut(&K) -> bool) -> Vec<K> {
        self.by_key.keys().filter(|k| filter(k)).cloned().collect()
    }

    /// Operations currently tracked
    pub fn ops(&self) -> Vec<OpId> {
        let mut ops: Vec<OpId> = self.by_op.keys().copied().collect();
        ops.sort_unstable();
        ops
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl<K, C, M> Default for LoadCoalescer<K, C, M>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
