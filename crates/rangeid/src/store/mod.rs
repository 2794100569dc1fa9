//! Versioned document storage.
//!
//! A [`DocumentStore`] holds one opaque document per key together with a
//! [`Version`]. Its only concurrency primitive is the conditional write:
//! [`DocumentStore::put`] succeeds only if the stored version still matches
//! the [`Precondition`] the writer observed. That compare-and-swap at document
//! granularity is everything the optimistic update protocol builds on.

mod file;
mod memory;

pub use file::*;
pub use memory::*;

use core::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Monotonically increasing version of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version assigned to a newly created document.
    pub const MIN: Version = Version(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Condition a write must satisfy to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The document must not exist yet.
    DoesNotExist,
    /// The document must still be at the given version.
    MatchesVersion(Version),
}

impl Precondition {
    /// Checks the precondition against the currently stored version and
    /// returns the version the write will be stored under.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FailedPrecondition`] if another writer got there
    /// first.
    pub fn check(self, current: Option<Version>) -> Result<Version, StoreError> {
        match (self, current) {
            (Precondition::DoesNotExist, None) => Ok(Version::MIN),
            (Precondition::MatchesVersion(expected), Some(actual)) if expected == actual => {
                Ok(actual.next())
            }
            (Precondition::DoesNotExist, Some(actual)) => Err(StoreError::FailedPrecondition(
                format!("document already exists at {actual}"),
            )),
            (Precondition::MatchesVersion(expected), actual) => {
                Err(StoreError::FailedPrecondition(format!(
                    "expected version {expected} but found {}",
                    actual.map_or_else(|| "no document".to_owned(), |v| v.to_string())
                )))
            }
        }
    }
}

/// A stored document and the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub version: Version,
    pub value: Bytes,
}

impl VersionedValue {
    pub fn new(version: Version, value: Bytes) -> Self {
        Self { version, value }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The conditional write lost against a concurrent writer.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The key cannot be stored by this backend.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored document is damaged and cannot be read until repaired.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if the same operation may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::FailedPrecondition(_) | StoreError::Unavailable(_) | StoreError::Io(_) => {
                true
            }
            StoreError::InvalidKey(_) | StoreError::Corrupt(_) | StoreError::Codec(_) => false,
        }
    }
}

/// Storage backend holding one versioned document per key.
///
/// Implementations must make reads reflect every write accepted before the
/// read started, and must accept at most one conditional write per version.
pub trait DocumentStore {
    /// Gets the document and its current version, or [`None`] if the key has
    /// never been written.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<VersionedValue>, StoreError>> + Send;

    /// Writes `value` under `key` if `precondition` holds, returning the new
    /// version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FailedPrecondition`] if the stored version no
    /// longer matches.
    fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: Precondition,
    ) -> impl Future<Output = Result<Version, StoreError>> + Send;
}

impl<S> DocumentStore for &S
where
    S: DocumentStore + Sync + ?Sized,
{
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<VersionedValue>, StoreError>> + Send {
        (**self).get(key)
    }

    fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: Precondition,
    ) -> impl Future<Output = Result<Version, StoreError>> + Send {
        (**self).put(key, value, precondition)
    }
}

impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + Send + Sync + ?Sized,
{
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<VersionedValue>, StoreError>> + Send {
        (**self).get(key)
    }

    fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: Precondition,
    ) -> impl Future<Output = Result<Version, StoreError>> + Send {
        (**self).put(key, value, precondition)
    }
}

/// Reads and decodes the document under `key`.
///
/// Returns the decoded value with its version, or [`None`] if the document
/// does not exist.
pub async fn read_document<S, T>(store: &S, key: &str) -> Result<Option<(Version, T)>, StoreError>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(versioned) => {
            let value = serde_json::from_slice(&versioned.value)?;
            Ok(Some((versioned.version, value)))
        }
        None => Ok(None),
    }
}

/// Encodes a document for [`DocumentStore::put`].
pub fn encode_document<T: Serialize>(value: &T) -> Result<Bytes, StoreError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}
