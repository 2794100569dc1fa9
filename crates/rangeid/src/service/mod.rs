//! Services applying allocation and assignment requests to ledgers.
//!
//! Both services mutate a [`ConsumptionLedger`] exclusively through
//! [`optimistic_update`], one ledger document per application. Requests are
//! independent of each other: no lock is held between them and nothing is
//! remembered except the optional advisory [`SnapshotCache`].

mod allocation;
mod assignment;

pub use allocation::*;
pub use assignment::*;

use std::sync::Arc;

use crate::{
    Clock, ConsumptionLedger, DocumentStore, Mutation, Result, SnapshotCache, UpdatePolicy,
    UpdateReport, optimistic_update, read_document,
};

/// State shared by the services: where ledgers live and how they are updated.
#[derive(Debug, Clone)]
struct LedgerContext<S, C> {
    store: S,
    policy: UpdatePolicy,
    cache: Option<Arc<SnapshotCache>>,
    clock: C,
}

impl<S, C> LedgerContext<S, C> {
    fn new(store: S, clock: C) -> Self {
        Self {
            store,
            policy: UpdatePolicy::DEFAULT,
            cache: None,
            clock,
        }
    }

    fn with_clock<C2>(self, clock: C2) -> LedgerContext<S, C2> {
        LedgerContext {
            store: self.store,
            policy: self.policy,
            cache: self.cache,
            clock,
        }
    }
}

impl<S, C> LedgerContext<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    /// Reads the current ledger from the store. A missing ledger reads as an
    /// empty one.
    async fn load(&self, app_id: &str) -> Result<ConsumptionLedger> {
        let ledger = read_document::<S, ConsumptionLedger>(&self.store, app_id).await?;
        Ok(ledger.map(|(_, ledger)| ledger).unwrap_or_default())
    }

    /// Ledger snapshot for computing a candidate.
    ///
    /// Advisory reads are served from the cache when one is configured;
    /// `fresh` reads always go to the store and refresh the cache.
    async fn snapshot(&self, app_id: &str, fresh: bool) -> Result<Arc<ConsumptionLedger>> {
        if !fresh {
            if let Some((_, ledger)) = self.cache.as_ref().and_then(|cache| cache.get(app_id)) {
                return Ok(ledger);
            }
        }

        match read_document::<S, ConsumptionLedger>(&self.store, app_id).await? {
            Some((version, ledger)) => {
                if let Some(cache) = &self.cache {
                    cache.refresh(app_id, version, ledger.clone());
                }
                Ok(Arc::new(ledger))
            }
            None => Ok(Arc::default()),
        }
    }

    /// Runs `mutate` against the application's ledger under the configured
    /// policy, refreshing the cache with whatever got committed.
    async fn update<R, F>(&self, app_id: &str, mutate: F) -> Result<UpdateReport<ConsumptionLedger, R>>
    where
        F: FnMut(ConsumptionLedger, u32) -> Mutation<ConsumptionLedger, R>,
    {
        let report = optimistic_update(&self.store, app_id, self.policy, mutate).await?;
        if let (Some(cache), Some(version)) = (&self.cache, report.committed) {
            cache.refresh(app_id, version, report.value.clone());
        }
        Ok(report)
    }

    fn now(&self) -> u64 {
        self.clock.current_millis()
    }
}
