use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{ConsumptionLedger, Version};

/// Latest known ledger snapshot per application, for advisory reads.
///
/// A cached snapshot may be stale. It is only ever used to compute a
/// candidate for a probe; reserving paths read the store and let the
/// conditional write decide. Services refresh the cache after each commit,
/// and older versions never replace newer ones.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, (Version, Arc<ConsumptionLedger>)>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached snapshot for `app_id` and the version it was read
    /// at.
    pub fn get(&self, app_id: &str) -> Option<(Version, Arc<ConsumptionLedger>)> {
        self.entries
            .read()
            .get(app_id)
            .map(|(version, ledger)| (*version, Arc::clone(ledger)))
    }

    /// Stores `ledger` unless a snapshot at `version` or newer is already
    /// cached. Returns `true` if the cache was updated.
    pub fn refresh(&self, app_id: &str, version: Version, ledger: ConsumptionLedger) -> bool {
        let mut entries = self.entries.write();
        match entries.get(app_id) {
            Some((cached, _)) if *cached >= version => false,
            _ => {
                entries.insert(app_id.to_owned(), (version, Arc::new(ledger)));
                true
            }
        }
    }

    /// Drops the snapshot for `app_id`, forcing the next probe to read the
    /// store.
    pub fn invalidate(&self, app_id: &str) {
        self.entries.write().remove(app_id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageKey;

    fn ledger_with(id: u32) -> ConsumptionLedger {
        let mut ledger = ConsumptionLedger::default();
        ledger.insert(&StorageKey::object("table"), id);
        ledger
    }

    #[test]
    fn keeps_newest_version() {
        let cache = SnapshotCache::new();
        let v1 = Version::MIN;
        let v2 = v1.next();

        assert!(cache.refresh("app", v2, ledger_with(2)));
        assert!(!cache.refresh("app", v1, ledger_with(1)));
        assert!(!cache.refresh("app", v2, ledger_with(3)));

        let (version, ledger) = cache.get("app").unwrap();
        assert_eq!(version, v2);
        assert_eq!(ledger.consumed(&StorageKey::object("table")), &[2]);
    }

    #[test]
    fn invalidate_forgets_snapshot() {
        let cache = SnapshotCache::new();
        cache.refresh("app", Version::MIN, ledger_with(1));
        cache.refresh("other", Version::MIN, ledger_with(1));

        cache.invalidate("app");
        assert!(cache.get("app").is_none());
        assert_eq!(cache.len(), 1);

        // Any version is accepted again after invalidation.
        assert!(cache.refresh("app", Version::MIN, ledger_with(5)));
    }
}
