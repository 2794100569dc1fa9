use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock timestamps for the ledger's event log.
///
/// This abstraction allows you to plug in the system clock or a fixed time
/// source in tests.
///
/// # Example
///
/// ```
/// use rangeid::Clock;
///
/// struct FixedTime;
/// impl Clock for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait Clock {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> u64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_millis(&self) -> u64 {
        // A clock set before 1970 logs zero rather than failing the update.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}
