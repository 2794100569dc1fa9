//! Optimistic read-modify-write against a [`DocumentStore`].
//!
//! [`optimistic_update`] reads a document, hands it to a mutation function
//! and writes the result back conditionally on the version it read. If a
//! concurrent writer got there first, the document is re-read and the
//! mutation re-invoked against the new value. Lost races are the expected
//! case and are visible to callers only through the attempt count.
//!
//! The mutation must be a pure function of the value it is given: it may run
//! once per attempt, each time against a different snapshot, and must not
//! rely on anything it computed in a previous attempt.
//!
//! Retries are immediate. There is no backoff: under contention every loser
//! re-reads at once, bounded only by [`UpdatePolicy::max_attempts`]. This
//! trades latency under heavy contention for a loop with no timers.

#[cfg(test)]
mod tests;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Error, Result,
    store::{DocumentStore, Precondition, StoreError, Version, encode_document, read_document},
};

/// Default ceiling on optimistic update attempts per operation.
pub const MAX_UPDATE_ATTEMPTS: u32 = 100;

/// Retry policy for [`optimistic_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePolicy {
    /// Number of conditional writes attempted before giving up with
    /// [`Error::TooManyAttempts`].
    pub max_attempts: u32,
}

impl UpdatePolicy {
    pub const DEFAULT: Self = Self {
        max_attempts: MAX_UPDATE_ATTEMPTS,
    };

    pub const fn with_max_attempts(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decision of a single mutation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<T, R> {
    /// Write `value` back, conditionally on the version that was read.
    Commit { value: T, result: R },
    /// Leave the document untouched and finish with `result`.
    ///
    /// Used when nothing needs to change (a no-op) or nothing can change
    /// (exhaustion). No write is attempted, so no retry follows.
    Skip { value: T, result: R },
}

/// Outcome of a finished [`optimistic_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport<T, R> {
    /// Result produced by the final mutation attempt.
    pub result: R,
    /// Zero-based index of the final attempt; `0` means no race was lost.
    pub attempts: u32,
    /// Version written by the final attempt, or [`None`] if it skipped.
    pub committed: Option<Version>,
    /// Document as written, or as read if the final attempt skipped.
    pub value: T,
}

impl<T, R> UpdateReport<T, R> {
    /// Returns `true` if the document was written.
    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }
}

/// Applies `mutate` to the document under `key` until a conditional write
/// succeeds, the mutation skips, or the policy's attempt ceiling is hit.
///
/// `mutate` receives the current document (or `T::default()` if it does not
/// exist yet) and the zero-based attempt number.
///
/// # Errors
///
/// - [`Error::TooManyAttempts`] if `policy.max_attempts` conditional writes
///   all lost against concurrent writers.
/// - [`Error::Store`] if the store fails for any other reason, or the
///   document cannot be decoded.
///
/// # Example
///
/// ```
/// use rangeid::{MemoryStore, Mutation, UpdatePolicy, optimistic_update};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), rangeid::Error> {
/// let store = MemoryStore::new();
/// let report = optimistic_update(&store, "counter", UpdatePolicy::DEFAULT, |count: u64, _| {
///     Mutation::Commit { value: count + 1, result: () }
/// })
/// .await?;
/// assert_eq!(report.value, 1);
/// assert_eq!(report.attempts, 0);
/// # Ok(())
/// # }
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(store, policy, mutate)))]
pub async fn optimistic_update<S, T, R, F>(
    store: &S,
    key: &str,
    policy: UpdatePolicy,
    mut mutate: F,
) -> Result<UpdateReport<T, R>>
where
    S: DocumentStore + ?Sized,
    T: Serialize + DeserializeOwned + Default,
    F: FnMut(T, u32) -> Mutation<T, R>,
{
    let mut attempt = 0;

    while attempt < policy.max_attempts {
        let (precondition, current) = match read_document::<S, T>(store, key).await? {
            Some((version, value)) => (Precondition::MatchesVersion(version), value),
            None => (Precondition::DoesNotExist, T::default()),
        };

        let (value, result) = match mutate(current, attempt) {
            Mutation::Skip { value, result } => {
                return Ok(UpdateReport {
                    result,
                    attempts: attempt,
                    committed: None,
                    value,
                });
            }
            Mutation::Commit { value, result } => (value, result),
        };

        let encoded = encode_document(&value)?;
        match store.put(key, encoded, precondition).await {
            Ok(version) => {
                return Ok(UpdateReport {
                    result,
                    attempts: attempt,
                    committed: Some(version),
                    value,
                });
            }
            Err(StoreError::FailedPrecondition(_msg)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Lost update race on {key} at attempt {attempt}: {_msg}");
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    #[cfg(feature = "tracing")]
    tracing::warn!("Giving up on {key} after {attempt} update attempts");

    Err(Error::TooManyAttempts {
        key: key.to_owned(),
        attempts: attempt,
    })
}
