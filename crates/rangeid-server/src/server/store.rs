use bytes::Bytes;
use rangeid::{
    DocumentStore, FileStore, MemoryStore, Precondition, StoreError, Version, VersionedValue,
};
use std::path::Path;

/// Ledger storage selected at startup.
#[derive(Debug)]
pub enum ServerStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl ServerStore {
    /// Opens a file store under `data_dir`, or an in-memory store when no
    /// directory is configured.
    pub async fn open(data_dir: Option<&Path>) -> Result<Self, StoreError> {
        match data_dir {
            Some(dir) => Ok(Self::File(FileStore::open(dir).await?)),
            None => Ok(Self::Memory(MemoryStore::new())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::File(_) => "file",
        }
    }
}

impl DocumentStore for ServerStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::File(store) => store.get(key).await,
        }
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: Precondition,
    ) -> Result<Version, StoreError> {
        match self {
            Self::Memory(store) => store.put(key, value, precondition).await,
            Self::File(store) => store.put(key, value, precondition).await,
        }
    }
}
