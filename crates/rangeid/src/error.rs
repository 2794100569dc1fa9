//! Error types for allocation and assignment.
//!
//! Only two failure modes ever leave the optimistic update loop: contention
//! exhaustion ([`Error::TooManyAttempts`]) and a failing document store
//! ([`Error::Store`]). Running out of free identifiers and no-op assignments
//! are ordinary results, not errors.
//!
//! The remaining variants describe malformed input and are produced by the
//! validation helpers a boundary runs before calling into the services.

use crate::store::StoreError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `rangeid` can produce.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Every optimistic update attempt lost the race against a concurrent
    /// writer.
    ///
    /// The ledger is left untouched. Callers should retry the whole request
    /// later rather than fall back to a different identifier.
    #[error("too many attempts at updating '{key}' ({attempts} attempts)")]
    TooManyAttempts { key: String, attempts: u32 },

    /// The underlying document store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A range whose lower bound lies above its upper bound, or that starts
    /// at zero.
    #[error("invalid range: {from}..{to}")]
    InvalidRange { from: u32, to: u32 },

    /// An identifier that can never be allocated (zero).
    #[error("invalid id: {0}")]
    InvalidId(u32),

    /// No ranges were supplied.
    #[error("no ranges specified")]
    EmptyRanges,

    /// A storage key that would collide with the ledger's own fields.
    #[error("invalid storage key: '{0}'")]
    InvalidKey(String),
}

impl Error {
    /// Returns `true` if repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TooManyAttempts { .. } => true,
            Error::Store(err) => err.is_retryable(),
            Error::InvalidRange { .. }
            | Error::InvalidId(_)
            | Error::EmptyRanges
            | Error::InvalidKey(_) => false,
        }
    }
}
