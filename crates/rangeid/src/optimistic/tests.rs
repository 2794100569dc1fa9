use core::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;

use super::*;
use crate::store::{MemoryStore, VersionedValue};

/// Store where a rival writer sneaks in an update right before each of the
/// first `rival_writes` puts.
struct RacingStore {
    inner: MemoryStore,
    rival_writes: AtomicU32,
    puts: AtomicU32,
}

impl RacingStore {
    fn new(rival_writes: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            rival_writes: AtomicU32::new(rival_writes),
            puts: AtomicU32::new(0),
        }
    }

    async fn rival_increment(&self, key: &str) -> Result<(), StoreError> {
        let (precondition, count) = match read_document::<_, u64>(&self.inner, key).await? {
            Some((version, count)) => (Precondition::MatchesVersion(version), count),
            None => (Precondition::DoesNotExist, 0),
        };
        self.inner
            .put(key, encode_document(&(count + 10))?, precondition)
            .await?;
        Ok(())
    }
}

impl DocumentStore for RacingStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: Precondition,
    ) -> Result<Version, StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let rival = self
            .rival_writes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if rival {
            self.rival_increment(key).await?;
        }
        self.inner.put(key, value, precondition).await
    }
}

/// Store whose conditional writes always lose.
#[derive(Default)]
struct ConflictingStore {
    inner: MemoryStore,
    puts: AtomicU32,
}

impl DocumentStore for ConflictingStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, _: &str, _: Bytes, _: Precondition) -> Result<Version, StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::FailedPrecondition("always conflicting".to_owned()))
    }
}

/// Store that is reachable for reads but refuses writes.
#[derive(Default)]
struct ReadOnlyStore {
    puts: AtomicU32,
}

impl DocumentStore for ReadOnlyStore {
    async fn get(&self, _: &str) -> Result<Option<VersionedValue>, StoreError> {
        Ok(None)
    }

    async fn put(&self, _: &str, _: Bytes, _: Precondition) -> Result<Version, StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::Unavailable("read only".to_owned()))
    }
}

fn increment(count: u64, _attempt: u32) -> Mutation<u64, u64> {
    Mutation::Commit {
        value: count + 1,
        result: count + 1,
    }
}

#[tokio::test]
async fn commits_on_first_attempt_without_contention() {
    let store = MemoryStore::new();

    let first = optimistic_update(&store, "counter", UpdatePolicy::DEFAULT, increment)
        .await
        .unwrap();
    assert_eq!(first.result, 1);
    assert_eq!(first.attempts, 0);
    assert_eq!(first.committed, Some(Version::MIN));

    let second = optimistic_update(&store, "counter", UpdatePolicy::DEFAULT, increment)
        .await
        .unwrap();
    assert_eq!(second.value, 2);
    assert_eq!(second.committed, Some(Version::MIN.next()));
}

#[tokio::test]
async fn reapplies_mutation_after_lost_race() {
    let store = RacingStore::new(2);
    let mut seen = Vec::new();

    let report = optimistic_update(&store, "counter", UpdatePolicy::DEFAULT, |count, attempt| {
        seen.push((attempt, count));
        increment(count, attempt)
    })
    .await
    .unwrap();

    // Each retry observes the rival's write instead of its own stale value.
    assert_eq!(seen, vec![(0, 0), (1, 10), (2, 20)]);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.value, 21);
    assert_eq!(store.puts.load(Ordering::Relaxed), 3);

    let (_, stored) = read_document::<_, u64>(&store, "counter")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, 21);
}

#[tokio::test]
async fn skip_leaves_document_untouched() {
    let store = RacingStore::new(0);

    let report = optimistic_update(&store, "counter", UpdatePolicy::DEFAULT, |count: u64, _| {
        Mutation::Skip {
            value: count,
            result: "nothing to do",
        }
    })
    .await
    .unwrap();

    assert!(!report.is_committed());
    assert_eq!(report.result, "nothing to do");
    assert_eq!(store.puts.load(Ordering::Relaxed), 0);
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let store = ConflictingStore::default();

    let err = optimistic_update(&store, "app", UpdatePolicy::DEFAULT, increment)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::TooManyAttempts { ref key, attempts: MAX_UPDATE_ATTEMPTS } if key == "app"
    ));
    assert!(err.is_retryable());
    assert_eq!(store.puts.load(Ordering::Relaxed), MAX_UPDATE_ATTEMPTS);
}

#[tokio::test]
async fn honours_custom_attempt_ceiling() {
    let store = ConflictingStore::default();
    let policy = UpdatePolicy::with_max_attempts(3);

    let err = optimistic_update(&store, "app", policy, increment)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TooManyAttempts { attempts: 3, .. }));
    assert_eq!(store.puts.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn other_store_errors_are_not_retried() {
    let store = ReadOnlyStore::default();

    let err = optimistic_update(&store, "app", UpdatePolicy::DEFAULT, increment)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Store(StoreError::Unavailable(_))));
    assert_eq!(store.puts.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn undecodable_documents_surface_codec_errors() {
    let store = MemoryStore::new();
    store
        .put("counter", Bytes::from_static(b"not json"), Precondition::DoesNotExist)
        .await
        .unwrap();

    let err = optimistic_update(&store, "counter", UpdatePolicy::DEFAULT, increment)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Store(StoreError::Codec(_))));
    assert!(!err.is_retryable());
}
