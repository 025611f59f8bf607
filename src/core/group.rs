// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Correlation Group Store
//!
//! Registry mapping correlation keys to live group state. Lifecycle is
//! enforced here, not at call sites: a group is created on first resolve,
//! and exists iff its queue is non-empty once the creating mutation step
//! finishes. Removal cancels the group's timer while the group lock is
//! still held, so a stale timer can never act on a replaced group — it
//! observes the `closed` flag instead.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::core::event::{Event, PathSet};
use crate::core::scheduler::ExpiryTimer;

/// One queued event with its extracted path data
#[derive(Debug, Clone)]
pub struct ReceivedItem {
    pub arrival: Instant,
    pub event: Event,
    pub path_set: PathSet,
}

impl ReceivedItem {
    pub fn path_keys(&self) -> Vec<String> {
        self.path_set.keys().cloned().collect()
    }
}

/// Live state for one correlation key
pub struct CorrelationGroup {
    pub key: String,
    pub queue: VecDeque<ReceivedItem>,
    timer: Option<ExpiryTimer>,
    closed: bool,
}

impl CorrelationGroup {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            queue: VecDeque::new(),
            timer: None,
            closed: false,
        }
    }

    /// True once the group has been removed from the registry; a caller
    /// that acquired the lock afterwards must not touch the queue.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_timer(&mut self, timer: ExpiryTimer) {
        self.timer = Some(timer);
    }

    /// Cancel the timer and mark the group dead. Called with the registry
    /// removal as one step, under the group lock.
    fn close(&mut self) {
        self.closed = true;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Key → group registry with atomic insert-if-absent
#[derive(Default)]
pub struct GroupRegistry {
    groups: DashMap<String, Arc<Mutex<CorrelationGroup>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Return the existing group for `key` or atomically create one.
    ///
    /// The second value is true when the group was created by this call;
    /// the caller is then responsible for arming its expiry timer.
    pub fn resolve(&self, key: &str) -> (Arc<Mutex<CorrelationGroup>>, bool) {
        match self.groups.entry(key.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let group = Arc::new(Mutex::new(CorrelationGroup::new(key)));
                entry.insert(Arc::clone(&group));
                (group, true)
            }
        }
    }

    /// Fetch without creating. The shard guard is released before the
    /// returned `Arc` is locked, keeping lock order one-way.
    pub fn get(&self, key: &str) -> Option<Arc<Mutex<CorrelationGroup>>> {
        self.groups.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a drained group: cancels its timer, marks it closed and
    /// deletes the registry entry, all while the caller holds the group
    /// lock.
    pub fn remove(&self, group: &mut CorrelationGroup) {
        group.close();
        self.groups.remove(&group.key);
    }

    /// Number of live groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Snapshot of the live correlation keys
    pub fn keys(&self) -> Vec<String> {
        self.groups.iter().map(|entry| entry.key().clone()).collect()
    }
}
