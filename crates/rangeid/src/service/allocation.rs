use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::LedgerContext;
use crate::{
    Clock, ConsumptionLedger, DocumentStore, EXHAUSTED, EventData, LedgerEvent, LogEntry,
    Mutation, Range, Result, SnapshotCache, StorageKey, SystemClock, UpdatePolicy, UpdateReport,
    find_available_per_range, find_first_available, restrict_to_containing, validate_ranges,
};

/// How many identifiers a request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AllocationMode {
    /// One identifier from the first range with a free slot.
    #[default]
    Single,
    /// One identifier inside each range.
    PerRange,
}

/// A request for the next free identifier under a storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    /// Application whose ledger is read and updated.
    pub app_id: String,
    pub key: StorageKey,
    /// Declared ranges of the application, in priority order.
    ///
    /// Nested keys of objects the application owns may additionally draw
    /// from [`OWN_OBJECT_NESTED_RANGE`](crate::OWN_OBJECT_NESTED_RANGE).
    pub ranges: Vec<Range>,
    pub mode: AllocationMode,
    /// Allocate within the range containing this id, claiming the id itself
    /// when it is still free. Only honoured in [`AllocationMode::PerRange`].
    pub required: Option<u32>,
    /// Store ids of extension keys under the extended object's key.
    pub redirect_extensions: bool,
    /// Commit the identifier instead of only probing for it.
    pub reserve: bool,
    /// Recorded in the ledger's event log.
    pub user: Option<String>,
}

impl AllocationRequest {
    pub fn new(app_id: impl Into<String>, key: StorageKey, ranges: Vec<Range>) -> Self {
        Self {
            app_id: app_id.into(),
            key,
            ranges,
            mode: AllocationMode::Single,
            required: None,
            redirect_extensions: false,
            reserve: false,
            user: None,
        }
    }

    #[must_use]
    pub fn reserve(mut self, reserve: bool) -> Self {
        self.reserve = reserve;
        self
    }

    #[must_use]
    pub fn per_range(mut self) -> Self {
        self.mode = AllocationMode::PerRange;
        self
    }

    #[must_use]
    pub fn require(mut self, id: u32) -> Self {
        self.required = Some(id);
        self
    }

    #[must_use]
    pub fn redirect_extensions(mut self, redirect: bool) -> Self {
        self.redirect_extensions = redirect;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Identifier(s) produced by an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllocatedId {
    Single(u32),
    /// One entry per range, [`EXHAUSTED`] where a range is full.
    PerRange(Vec<u32>),
}

impl AllocatedId {
    /// Returns `true` if at least one identifier was found.
    pub fn is_available(&self) -> bool {
        match self {
            AllocatedId::Single(id) => *id != EXHAUSTED,
            AllocatedId::PerRange(ids) => ids.iter().any(|&id| id != EXHAUSTED),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationResponse {
    pub id: AllocatedId,
    pub available: bool,
    /// Whether the ledger was written.
    pub updated: bool,
    /// Zero-based attempt count of the update; the highest across ranges in
    /// per-range mode.
    pub attempts: u32,
    /// Whether the key had any consumption before this request.
    pub had_prior_consumption: bool,
}

/// Result of applying a candidate to one ledger snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The identifier was inserted into the snapshot.
    Claimed(u32),
    /// Every eligible identifier is consumed. Retrying cannot help, so the
    /// update stops without writing.
    Exhausted,
}

/// Claims `candidate` under `key` in `ledger`, or the next free identifier in
/// `ranges` if a concurrent writer already consumed it.
///
/// The decision depends only on the arguments, so it can be re-applied to a
/// newer snapshot after a lost race.
///
/// # Example
///
/// ```
/// use rangeid::{AttemptOutcome, ConsumptionLedger, Range, StorageKey, claim};
///
/// let key = StorageKey::object("table");
/// let ranges = [Range::new(1, 3)?];
/// let mut ledger = ConsumptionLedger::default();
///
/// assert_eq!(claim(&mut ledger, &key, 1, &ranges), AttemptOutcome::Claimed(1));
/// // 1 is gone now, so the same candidate yields the next free id.
/// assert_eq!(claim(&mut ledger, &key, 1, &ranges), AttemptOutcome::Claimed(2));
/// assert_eq!(claim(&mut ledger, &key, 1, &ranges), AttemptOutcome::Claimed(3));
/// assert_eq!(claim(&mut ledger, &key, 1, &ranges), AttemptOutcome::Exhausted);
/// # Ok::<(), rangeid::Error>(())
/// ```
pub fn claim(
    ledger: &mut ConsumptionLedger,
    key: &StorageKey,
    candidate: u32,
    ranges: &[Range],
) -> AttemptOutcome {
    let id = if candidate == EXHAUSTED || ledger.contains(key, candidate) {
        match find_first_available(ranges, ledger.consumed(key)) {
            EXHAUSTED => return AttemptOutcome::Exhausted,
            id => id,
        }
    } else {
        candidate
    };
    ledger.insert(key, id);
    AttemptOutcome::Claimed(id)
}

/// Hands out free identifiers and optionally reserves them in the ledger.
///
/// Probes (`reserve == false`) never write and may be served from a stale
/// snapshot. Reservations read the current ledger and commit through the
/// optimistic update protocol, so no two reservations under the same storage
/// key ever commit the same identifier.
#[derive(Debug, Clone)]
pub struct AllocationService<S, C = SystemClock> {
    ctx: LedgerContext<S, C>,
}

impl<S> AllocationService<S> {
    pub fn new(store: S) -> Self {
        Self {
            ctx: LedgerContext::new(store, SystemClock),
        }
    }
}

impl<S, C> AllocationService<S, C> {
    #[must_use]
    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.ctx.policy = policy;
        self
    }

    /// Serves probes from `cache` and keeps it current after every commit.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.ctx.cache = Some(cache);
        self
    }

    pub fn with_clock<C2>(self, clock: C2) -> AllocationService<S, C2> {
        AllocationService {
            ctx: self.ctx.with_clock(clock),
        }
    }

    pub fn document_store(&self) -> &S {
        &self.ctx.store
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.ctx.policy
    }
}

impl<S, C> AllocationService<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    /// Finds the next free identifier(s) for `request.key` and reserves them
    /// if requested.
    ///
    /// Running out of identifiers is not an error: the response reports
    /// `available == false` and nothing is written.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyRanges`](crate::Error::EmptyRanges) or
    ///   [`Error::InvalidRange`](crate::Error::InvalidRange) for malformed
    ///   ranges and [`Error::InvalidKey`](crate::Error::InvalidKey) for a key
    ///   that can never be stored, before the ledger is touched.
    /// - [`Error::TooManyAttempts`](crate::Error::TooManyAttempts) if every
    ///   update attempt lost against concurrent writers.
    /// - [`Error::Store`](crate::Error::Store) if the store fails.
    ///
    /// # Per-range reservations
    ///
    /// Each range is reserved by its own update, in range order. If a later
    /// range fails with an error, identifiers already committed for earlier
    /// ranges stay consumed in the ledger but are not reported; they show up
    /// in [`consumption`](Self::consumption) and can be reclaimed with
    /// [`AssignmentService::remove`](crate::AssignmentService::remove).
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip_all,
            fields(app_id = %request.app_id, key = %request.key, reserve = request.reserve)
        )
    )]
    pub async fn allocate(&self, request: &AllocationRequest) -> Result<AllocationResponse> {
        validate_ranges(&request.ranges)?;

        // Eligibility depends on the key as requested, before redirection.
        let eligible = request.key.eligible_ranges(&request.ranges);
        let key = if request.redirect_extensions {
            request.key.clone().redirect_extension()
        } else {
            request.key.clone()
        };
        key.validate()?;
        let required = match request.mode {
            AllocationMode::PerRange => request.required,
            AllocationMode::Single => None,
        };
        let ranges = match required {
            Some(required) => restrict_to_containing(&eligible, required),
            None => eligible,
        };

        let snapshot = self.ctx.snapshot(&request.app_id, request.reserve).await?;
        let consumed = snapshot.consumed(&key);
        let had_prior_consumption = !consumed.is_empty();
        let id = match request.mode {
            AllocationMode::Single => AllocatedId::Single(find_first_available(&ranges, consumed)),
            AllocationMode::PerRange => {
                AllocatedId::PerRange(find_available_per_range(&ranges, consumed))
            }
        };
        let available = id.is_available();

        let probe = AllocationResponse {
            id,
            available,
            updated: false,
            attempts: 0,
            had_prior_consumption,
        };
        if !request.reserve {
            return Ok(probe);
        }
        if !available {
            #[cfg(feature = "tracing")]
            tracing::debug!("No ids left for {key} in {}", request.app_id);
            return Ok(probe);
        }

        let response = match (probe.id, required) {
            (AllocatedId::Single(candidate), _) => {
                let report = self.reserve(request, &key, &ranges, candidate).await?;
                single_response(&report, had_prior_consumption)
            }
            // The range was narrowed to the one containing `required`; claim
            // the required id itself, or the next free one beside it.
            (AllocatedId::PerRange(_), Some(required)) => {
                let report = self.reserve(request, &key, &ranges, required).await?;
                single_response(&report, had_prior_consumption)
            }
            (AllocatedId::PerRange(candidates), None) => {
                let mut ids = Vec::with_capacity(candidates.len());
                let mut updated = false;
                let mut attempts = 0;
                for (range, candidate) in ranges.iter().zip(candidates) {
                    if candidate == EXHAUSTED {
                        ids.push(EXHAUSTED);
                        continue;
                    }
                    let report = self
                        .reserve(request, &key, core::slice::from_ref(range), candidate)
                        .await?;
                    ids.push(match report.result {
                        AttemptOutcome::Claimed(id) => id,
                        AttemptOutcome::Exhausted => EXHAUSTED,
                    });
                    updated |= report.is_committed();
                    attempts = attempts.max(report.attempts);
                }
                let id = AllocatedId::PerRange(ids);
                AllocationResponse {
                    available: id.is_available(),
                    id,
                    updated,
                    attempts,
                    had_prior_consumption,
                }
            }
        };
        Ok(response)
    }

    /// Reads the current ledger of `app_id`, or an empty ledger if the
    /// application has never consumed anything.
    ///
    /// Always reads the store, bypassing the snapshot cache.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub async fn consumption(&self, app_id: &str) -> Result<ConsumptionLedger> {
        self.ctx.load(app_id).await
    }

    async fn reserve(
        &self,
        request: &AllocationRequest,
        key: &StorageKey,
        ranges: &[Range],
        candidate: u32,
    ) -> Result<UpdateReport<ConsumptionLedger, AttemptOutcome>> {
        let report = self
            .ctx
            .update(&request.app_id, |mut ledger, _attempt| {
                match claim(&mut ledger, key, candidate, ranges) {
                    AttemptOutcome::Claimed(id) => {
                        ledger.set_ranges(request.ranges.clone());
                        ledger.record(LogEntry::new(
                            LedgerEvent::GetNext,
                            self.ctx.now(),
                            request.user.as_deref(),
                            EventData::assignment(key, id),
                        ));
                        Mutation::Commit {
                            value: ledger,
                            result: AttemptOutcome::Claimed(id),
                        }
                    }
                    AttemptOutcome::Exhausted => Mutation::Skip {
                        value: ledger,
                        result: AttemptOutcome::Exhausted,
                    },
                }
            })
            .await?;

        #[cfg(feature = "tracing")]
        match report.result {
            AttemptOutcome::Claimed(_id) => tracing::debug!(
                "Reserved {_id} for {key} in {} after {} lost races",
                request.app_id,
                report.attempts
            ),
            AttemptOutcome::Exhausted => {
                tracing::debug!("Ran out of ids for {key} in {} while reserving", request.app_id)
            }
        }

        Ok(report)
    }
}

fn single_response(
    report: &UpdateReport<ConsumptionLedger, AttemptOutcome>,
    had_prior_consumption: bool,
) -> AllocationResponse {
    let id = match report.result {
        AttemptOutcome::Claimed(id) => id,
        AttemptOutcome::Exhausted => EXHAUSTED,
    };
    AllocationResponse {
        id: AllocatedId::Single(id),
        available: id != EXHAUSTED,
        updated: report.is_committed(),
        attempts: report.attempts,
        had_prior_consumption,
    }
}
