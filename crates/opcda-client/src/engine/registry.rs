// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Item bookkeeping for one engine.
//!
//! All maps live in one structure behind one lock. The registry performs no
//! I/O and never calls out, so holding its lock is always short.
//!
//! ```text
//! desired     ItemId       -> callback       (survives reconnects)
//! realized    ItemId       -> Item           (only while active)
//! subscribed  ClientHandle -> callback       (mirrors realized)
//! cache       ClientHandle -> ItemState      (last dispatched state)
//! pending     ItemId                         (realization in flight)
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use opcda_core::{ClientHandle, ItemId, ItemState};

use super::listener::ItemCallback;
use crate::group::Item;

/// Token identifying one realization round.
///
/// Unrealizing everything bumps the generation so completions from an
/// earlier round are recognised as stale.
pub(crate) type Generation = u64;

#[derive(Default)]
pub(crate) struct ItemRegistry {
    desired: HashMap<ItemId, Arc<dyn ItemCallback>>,
    realized: HashMap<ItemId, Item>,
    subscribed: HashMap<ClientHandle, Arc<dyn ItemCallback>>,
    cache: HashMap<ClientHandle, ItemState>,
    pending: HashSet<ItemId>,
    generation: Generation,
}

impl ItemRegistry {
    /// Records a desired item. Returns `false` if it was already desired.
    pub fn desire(&mut self, item_id: ItemId, callback: Arc<dyn ItemCallback>) -> bool {
        if self.desired.contains_key(&item_id) {
            return false;
        }
        self.desired.insert(item_id, callback);
        true
    }

    /// Marks one desired item as being realized.
    ///
    /// Returns `None` if it is unknown, already realized or already pending.
    pub fn begin_realize(&mut self, item_id: &ItemId) -> Option<Generation> {
        if !self.desired.contains_key(item_id)
            || self.realized.contains_key(item_id)
            || self.pending.contains(item_id)
        {
            return None;
        }
        self.pending.insert(item_id.clone());
        Some(self.generation)
    }

    /// Marks every desired, unrealized, non-pending item as being realized.
    pub fn begin_realize_all(&mut self) -> (Vec<ItemId>, Generation) {
        let ids: Vec<ItemId> = self
            .desired
            .keys()
            .filter(|id| !self.realized.contains_key(*id) && !self.pending.contains(*id))
            .cloned()
            .collect();
        self.pending.extend(ids.iter().cloned());
        (ids, self.generation)
    }

    /// Records the outcome of a realization round.
    ///
    /// Every id in `attempted` leaves the pending set. Added items that are
    /// no longer wanted (removed meanwhile, or from a stale round) are
    /// returned so the caller can remove them from the server.
    pub fn complete_realize(
        &mut self,
        generation: Generation,
        attempted: &[ItemId],
        added: Vec<Item>,
    ) -> Vec<Item> {
        let current = generation == self.generation;
        let mut orphans = Vec::new();

        for item in added {
            let wanted = current && self.pending.contains(item.item_id());
            match self.desired.get(item.item_id()) {
                Some(callback) if wanted => {
                    self.subscribed.insert(item.client_handle(), Arc::clone(callback));
                    self.realized.insert(item.item_id().clone(), item);
                }
                _ => orphans.push(item),
            }
        }

        if current {
            for id in attempted {
                self.pending.remove(id);
            }
        }
        orphans
    }

    /// Abandons a realization round that failed as a whole.
    pub fn cancel_realize(&mut self, generation: Generation, attempted: &[ItemId]) {
        if generation == self.generation {
            for id in attempted {
                self.pending.remove(id);
            }
        }
    }

    /// Forgets a desired item and unrealizes it.
    ///
    /// Returns `(was_desired, realized_item)`.
    pub fn remove(&mut self, item_id: &ItemId) -> (bool, Option<Item>) {
        let was_desired = self.desired.remove(item_id).is_some();
        self.pending.remove(item_id);
        (was_desired, self.unrealize(item_id))
    }

    /// Drops the realized entry, subscription and cache of one item.
    fn unrealize(&mut self, item_id: &ItemId) -> Option<Item> {
        let item = self.realized.remove(item_id)?;
        self.subscribed.remove(&item.client_handle());
        self.cache.remove(&item.client_handle());
        Some(item)
    }

    /// Unrealizes everything and starts a new generation.
    pub fn unrealize_all(&mut self) -> Vec<Item> {
        self.generation = self.generation.wrapping_add(1);
        self.pending.clear();
        self.subscribed.clear();
        self.cache.clear();
        self.realized.drain().map(|(_, item)| item).collect()
    }

    /// Applies change detection for one observed state.
    ///
    /// Returns the callback to invoke, or `None` if `item` is not the one
    /// currently realized under its id or the state equals the cached one.
    pub fn observe(&mut self, item: &Item, state: &ItemState) -> Option<Arc<dyn ItemCallback>> {
        // Client handles restart with every group, so an item from an
        // earlier group may share its handle with a current one.
        if self.realized.get(item.item_id()) != Some(item) {
            return None;
        }
        let handle = item.client_handle();
        let callback = self.subscribed.get(&handle)?;
        if self.cache.get(&handle) == Some(state) {
            return None;
        }
        let callback = Arc::clone(callback);
        self.cache.insert(handle, state.clone());
        Some(callback)
    }

    /// Returns the realized item for an id.
    pub fn realized_item(&self, item_id: &ItemId) -> Option<Item> {
        self.realized.get(item_id).cloned()
    }

    /// Returns a snapshot of all realized items.
    pub fn realized_items(&self) -> Vec<Item> {
        self.realized.values().cloned().collect()
    }

    /// Returns the desired ids.
    pub fn desired_ids(&self) -> Vec<ItemId> {
        self.desired.keys().cloned().collect()
    }

    /// Returns the realized ids.
    pub fn realized_ids(&self) -> Vec<ItemId> {
        self.realized.keys().cloned().collect()
    }

    /// Returns `true` if the id is desired.
    #[cfg(test)]
    pub fn is_desired(&self, item_id: &ItemId) -> bool {
        self.desired.contains_key(item_id)
    }

    /// Returns the cached state of a realized item.
    pub fn cached_state(&self, item_id: &ItemId) -> Option<ItemState> {
        let item = self.realized.get(item_id)?;
        self.cache.get(&item.client_handle()).cloned()
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        for id in self.realized.keys() {
            assert!(self.desired.contains_key(id), "realized {} not desired", id);
        }
        assert_eq!(self.realized.len(), self.subscribed.len());
        for handle in self.cache.keys() {
            assert!(self.subscribed.contains_key(handle));
        }
    }
}
