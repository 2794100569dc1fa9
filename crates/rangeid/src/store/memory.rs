use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

use super::{DocumentStore, Precondition, StoreError, Version, VersionedValue};

/// In-process [`DocumentStore`] keeping every document in a map.
///
/// Reads and conditional writes are serialized by a single mutex, which is
/// never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, VersionedValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        Ok(self.documents.lock().get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: Precondition,
    ) -> Result<Version, StoreError> {
        let mut documents = self.documents.lock();
        let current = documents.get(key).map(|document| document.version);
        let version = precondition.check(current)?;
        documents.insert(key.to_owned(), VersionedValue::new(version, value));
        Ok(version)
    }
}
