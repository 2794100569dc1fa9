//! The per-application record of consumed identifiers.
//!
//! A [`ConsumptionLedger`] is the document the optimistic update protocol
//! reads and conditionally writes. It maps every [`StorageKey`] in use to the
//! ascending, duplicate-free list of identifiers consumed under it, and also
//! carries the application's declared ranges and an append-only event log.
//!
//! The ascending order is an invariant every mutator maintains, not just an
//! output property: the allocator relies on it. Keys whose list becomes empty
//! are removed, so the key space is exactly the set of categories in use.
//!
//! ## Document shape
//!
//! ```json
//! {
//!   "_ranges": [{ "from": 50000, "to": 50099 }],
//!   "_log": [{ "eventType": "getNext", "timestamp": 0, "data": { "type": "table", "id": 50000 } }],
//!   "table": [50000],
//!   "table_50000": [1, 2, 3]
//! }
//! ```

mod event;

pub use event::*;

use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};

use crate::{Range, StorageKey};

/// Consumed identifiers per storage key, as reported by a source scan or
/// stored in a ledger.
pub type Consumption = BTreeMap<StorageKey, Vec<u32>>;

/// Persisted record of consumed identifiers for one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionLedger {
    #[serde(rename = "_ranges", default, skip_serializing_if = "Vec::is_empty")]
    ranges: Vec<Range>,
    #[serde(rename = "_log", default, skip_serializing_if = "Vec::is_empty")]
    log: Vec<LogEntry>,
    #[serde(flatten)]
    consumption: Consumption,
}

impl ConsumptionLedger {
    /// Identifiers consumed under `key`, ascending. Empty if the key is not in
    /// use.
    pub fn consumed(&self, key: &StorageKey) -> &[u32] {
        self.consumption.get(key).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if at least one identifier is consumed under `key`.
    pub fn has_consumption(&self, key: &StorageKey) -> bool {
        !self.consumed(key).is_empty()
    }

    /// Returns `true` if `id` is consumed under `key`.
    pub fn contains(&self, key: &StorageKey, id: u32) -> bool {
        self.consumed(key).binary_search(&id).is_ok()
    }

    /// Records `id` under `key`, keeping the list sorted.
    ///
    /// Returns `false` if `id` was already present.
    pub fn insert(&mut self, key: &StorageKey, id: u32) -> bool {
        let ids = self.consumption.entry(key.clone()).or_default();
        match ids.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                ids.insert(pos, id);
                true
            }
        }
    }

    /// Removes `id` from `key`, dropping the key when its list becomes empty.
    ///
    /// Returns `false` if `id` was not present.
    pub fn remove(&mut self, key: &StorageKey, id: u32) -> bool {
        let btree_map::Entry::Occupied(mut entry) = self.consumption.entry(key.clone()) else {
            return false;
        };
        let Ok(pos) = entry.get().binary_search(&id) else {
            return false;
        };
        entry.get_mut().remove(pos);
        if entry.get().is_empty() {
            entry.remove();
        }
        true
    }

    /// Replaces all consumption with `snapshot`. Keys missing from the
    /// snapshot are dropped.
    ///
    /// Returns `true` if the stored consumption changed.
    pub fn replace_consumption(&mut self, snapshot: Consumption) -> bool {
        let replaced = normalize(snapshot);
        if replaced == self.consumption {
            return false;
        }
        self.consumption = replaced;
        true
    }

    /// Unions `snapshot` into the stored consumption.
    ///
    /// Returns `true` if the stored consumption changed.
    pub fn merge_consumption(&mut self, snapshot: Consumption) -> bool {
        let mut changed = false;
        for (key, ids) in snapshot {
            for id in ids {
                changed |= self.insert(&key, id);
            }
        }
        changed
    }

    /// Declared ranges of the application, used for reporting ids that fall
    /// outside them.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn set_ranges(&mut self, ranges: Vec<Range>) {
        self.ranges = ranges;
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Appends to the event log.
    ///
    /// The log is never truncated: it grows by one entry per committed
    /// update and is decoded and re-encoded with the rest of the document on
    /// every update attempt.
    pub fn record(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }

    /// Iterates keys in use together with their consumed identifiers.
    pub fn iter(&self) -> impl Iterator<Item = (&StorageKey, &[u32])> {
        self.consumption
            .iter()
            .map(|(key, ids)| (key, ids.as_slice()))
    }

    pub fn consumption(&self) -> &Consumption {
        &self.consumption
    }

    /// Total number of consumed identifiers across all keys.
    pub fn total(&self) -> usize {
        self.consumption.values().map(Vec::len).sum()
    }

    /// Returns `true` if no identifier is consumed under any key.
    pub fn is_empty(&self) -> bool {
        self.consumption.is_empty()
    }
}

fn normalize(snapshot: Consumption) -> Consumption {
    snapshot
        .into_iter()
        .filter_map(|(key, mut ids)| {
            ids.sort_unstable();
            ids.dedup();
            (!ids.is_empty()).then_some((key, ids))
        })
        .collect()
}
