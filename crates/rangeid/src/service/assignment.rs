use std::sync::Arc;

use super::LedgerContext;
use crate::{
    Clock, Consumption, DocumentStore, Error, EventData, LedgerEvent, LogEntry, Mutation, Result,
    SnapshotCache, StorageKey, SystemClock, UpdatePolicy,
};

/// Records or reclaims an identifier chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRequest {
    pub app_id: String,
    pub key: StorageKey,
    pub id: u32,
    pub user: Option<String>,
}

impl AssignmentRequest {
    pub fn new(app_id: impl Into<String>, key: StorageKey, id: u32) -> Self {
        Self {
            app_id: app_id.into(),
            key,
            id,
            user: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentResponse {
    /// `false` if the ledger already was in the requested state.
    pub updated: bool,
}

/// How a scanned snapshot is reconciled with stored consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// The snapshot becomes the stored consumption; keys it lacks are
    /// dropped.
    #[default]
    Replace,
    /// The snapshot is unioned into stored consumption.
    Merge,
}

impl SyncMode {
    pub fn is_merge(self) -> bool {
        matches!(self, SyncMode::Merge)
    }
}

/// Reconciles an application's ledger with consumption found in its sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub app_id: String,
    pub consumption: Consumption,
    pub mode: SyncMode,
    pub user: Option<String>,
}

impl SyncRequest {
    pub fn new(app_id: impl Into<String>, consumption: Consumption, mode: SyncMode) -> Self {
        Self {
            app_id: app_id.into(),
            consumption,
            mode,
            user: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Applies caller-chosen changes to ledgers.
///
/// Unlike allocation there is nothing to recompute on a lost race: each
/// attempt only checks whether the identifier is present. Repeating a request
/// is harmless and reports `updated == false`.
#[derive(Debug, Clone)]
pub struct AssignmentService<S, C = SystemClock> {
    ctx: LedgerContext<S, C>,
}

impl<S> AssignmentService<S> {
    pub fn new(store: S) -> Self {
        Self {
            ctx: LedgerContext::new(store, SystemClock),
        }
    }
}

impl<S, C> AssignmentService<S, C> {
    #[must_use]
    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.ctx.policy = policy;
        self
    }

    /// Keeps `cache` current after every commit.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.ctx.cache = Some(cache);
        self
    }

    pub fn with_clock<C2>(self, clock: C2) -> AssignmentService<S, C2> {
        AssignmentService {
            ctx: self.ctx.with_clock(clock),
        }
    }

    pub fn document_store(&self) -> &S {
        &self.ctx.store
    }
}

impl<S, C> AssignmentService<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    /// Records `request.id` as consumed under `request.key`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidId`] for id zero, [`Error::InvalidKey`] for a key
    /// [`StorageKey::validate`](crate::StorageKey::validate) rejects,
    /// otherwise as [`optimistic_update`](crate::optimistic_update).
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(app_id = %request.app_id, key = %request.key, id = request.id))
    )]
    pub async fn store(&self, request: &AssignmentRequest) -> Result<AssignmentResponse> {
        let AssignmentRequest { app_id, key, id, user } = request;
        if *id == 0 {
            return Err(Error::InvalidId(*id));
        }
        key.validate()?;

        let report = self
            .ctx
            .update(app_id, |mut ledger, _attempt| {
                if !ledger.insert(key, *id) {
                    return Mutation::Skip {
                        value: ledger,
                        result: (),
                    };
                }
                ledger.record(LogEntry::new(
                    LedgerEvent::AddAssignment,
                    self.ctx.now(),
                    user.as_deref(),
                    EventData::assignment(key, *id),
                ));
                Mutation::Commit {
                    value: ledger,
                    result: (),
                }
            })
            .await?;

        #[cfg(feature = "tracing")]
        if !report.is_committed() {
            tracing::debug!("{id} already assigned under {key} in {app_id}");
        }

        Ok(AssignmentResponse {
            updated: report.is_committed(),
        })
    }

    /// Reclaims `request.id` from `request.key`. The key is dropped from the
    /// ledger once its last identifier is gone.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidKey`] for a key that can never be stored, otherwise as
    /// [`optimistic_update`](crate::optimistic_update).
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(app_id = %request.app_id, key = %request.key, id = request.id))
    )]
    pub async fn remove(&self, request: &AssignmentRequest) -> Result<AssignmentResponse> {
        let AssignmentRequest { app_id, key, id, user } = request;
        key.validate()?;

        let report = self
            .ctx
            .update(app_id, |mut ledger, _attempt| {
                if !ledger.remove(key, *id) {
                    return Mutation::Skip {
                        value: ledger,
                        result: (),
                    };
                }
                ledger.record(LogEntry::new(
                    LedgerEvent::RemoveAssignment,
                    self.ctx.now(),
                    user.as_deref(),
                    EventData::assignment(key, *id),
                ));
                Mutation::Commit {
                    value: ledger,
                    result: (),
                }
            })
            .await?;

        #[cfg(feature = "tracing")]
        if !report.is_committed() {
            tracing::debug!("{id} not assigned under {key} in {app_id}");
        }

        Ok(AssignmentResponse {
            updated: report.is_committed(),
        })
    }

    /// Reconciles stored consumption with `request.consumption`.
    ///
    /// Declared ranges and the event log are kept. Ids are sorted and
    /// deduplicated and empty keys are not stored.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidId`] if the snapshot contains id zero and
    /// [`Error::InvalidKey`] if it names a key that can never be stored,
    /// otherwise as [`optimistic_update`](crate::optimistic_update).
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(app_id = %request.app_id, mode = ?request.mode))
    )]
    pub async fn synchronize(&self, request: &SyncRequest) -> Result<AssignmentResponse> {
        if request.consumption.values().flatten().any(|&id| id == 0) {
            return Err(Error::InvalidId(0));
        }
        for key in request.consumption.keys() {
            key.validate()?;
        }

        let report = self
            .ctx
            .update(&request.app_id, |mut ledger, _attempt| {
                let snapshot = request.consumption.clone();
                let changed = match request.mode {
                    SyncMode::Replace => ledger.replace_consumption(snapshot),
                    SyncMode::Merge => ledger.merge_consumption(snapshot),
                };
                if !changed {
                    return Mutation::Skip {
                        value: ledger,
                        result: (),
                    };
                }
                ledger.record(LogEntry::new(
                    LedgerEvent::SyncIds,
                    self.ctx.now(),
                    request.user.as_deref(),
                    EventData::sync(request.mode.is_merge()),
                ));
                Mutation::Commit {
                    value: ledger,
                    result: (),
                }
            })
            .await?;

        Ok(AssignmentResponse {
            updated: report.is_committed(),
        })
    }
}
