use time::OffsetDateTime;

/// Source of wall-clock time for expiry arithmetic.
///
/// Injected so lifecycle decisions are testable; production code uses
/// [`SystemClock`].
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;

    /// Current time as unix milliseconds, the unit persisted in the store.
    fn now_millis(&self) -> i64 {
        unix_millis(self.now())
    }
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Converts a timestamp to unix milliseconds.
#[must_use]
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Converts unix milliseconds back to a timestamp.
#[must_use]
pub fn from_unix_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
