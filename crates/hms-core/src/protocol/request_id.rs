//! Request id generation.
//!
//! Every packet carries a `request_id` that the peer echoes back in its
//! [`ResponsePacket`](crate::protocol::packet::ResponsePacket).  The id only
//! has to be unique for the life of a connection, so a process-wide counter
//! seeded from the wall clock is enough: two processes started at different
//! instants produce disjoint ranges, and within one process the counter never
//! repeats until it wraps at `u64::MAX`.
//!
//! # Thread safety
//!
//! The counter is an `AtomicU64` advanced with `fetch_add`, so packets built
//! concurrently on different worker tasks always receive distinct ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// A thread-safe, monotonically increasing source of request ids.
///
/// # Examples
///
/// ```rust
/// use hms_core::protocol::RequestIdGenerator;
///
/// let ids = RequestIdGenerator::starting_at(100);
/// assert_eq!(ids.next(), 100);
/// assert_eq!(ids.next(), 101);
/// ```
#[derive(Debug)]
pub struct RequestIdGenerator {
    inner: AtomicU64,
}

impl RequestIdGenerator {
    /// Creates a generator whose first id is `seed`.
    pub fn starting_at(seed: u64) -> Self {
        Self {
            inner: AtomicU64::new(seed),
        }
    }

    /// Creates a generator seeded with the current time in nanoseconds.
    pub fn from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self::starting_at(seed)
    }

    /// Returns the next id and advances the counter.
    ///
    /// Wraps from `u64::MAX` to 0 without panicking.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the id the next call to [`next`](Self::next) would produce.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::from_clock()
    }
}

static PROCESS_IDS: OnceLock<RequestIdGenerator> = OnceLock::new();

/// Returns a fresh id from the process-wide generator.
pub fn next_request_id() -> u64 {
    PROCESS_IDS.get_or_init(RequestIdGenerator::from_clock).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_generator_starts_at_seed() {
        // Arrange
        let ids = RequestIdGenerator::starting_at(42);

        // Act
        let first = ids.next();

        // Assert
        assert_eq!(first, 42);
    }

    #[test]
    fn test_generator_increments_monotonically() {
        let ids = RequestIdGenerator::starting_at(0);

        let values: Vec<u64> = (0..100).map(|_| ids.next()).collect();

        for window in values.windows(2) {
            assert!(window[1] > window[0], "ids must be strictly increasing");
        }
    }

    #[test]
    fn test_generator_wraps_at_u64_max() {
        let ids = RequestIdGenerator::starting_at(u64::MAX);

        let before_wrap = ids.next();
        let after_wrap = ids.next();

        assert_eq!(before_wrap, u64::MAX);
        assert_eq!(after_wrap, 0);
    }

    #[test]
    fn test_clock_seed_is_nonzero() {
        let ids = RequestIdGenerator::from_clock();

        assert!(ids.current() > 0);
    }

    #[test]
    fn test_current_does_not_advance() {
        let ids = RequestIdGenerator::starting_at(10);
        ids.next();

        assert_eq!(ids.current(), 11);
        assert_eq!(ids.next(), 11);
    }

    #[test]
    fn test_process_ids_are_unique_across_threads() {
        // Arrange
        let thread_count = 8;
        let per_thread = 500;
        let barrier = Arc::new(std::sync::Barrier::new(thread_count));

        // Act – draw ids from many threads at once
        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..per_thread).map(|_| next_request_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), thread_count * per_thread);
    }
}
