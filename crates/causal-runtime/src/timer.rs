//! Sleep helpers shared by the scheduler thread and delay reconciliation
//!
//! Everything here is safe to call from the SIGPROF handler: no allocation,
//! `thread::sleep` (which resumes after EINTR) and monotonic clock reads only.

use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

/// Sleep for `ns` nanoseconds and return how long actually elapsed.
///
/// Non-positive requests return 0 immediately.
#[inline]
pub fn sleep_ns(ns: i64) -> i64 {
    if ns <= 0 {
        return 0;
    }
    let start = Instant::now();
    thread::sleep(Duration::from_nanos(ns as u64));
    duration_ns(start.elapsed())
}

/// Sleep and return the elapsed duration
#[inline]
pub fn sleep(d: Duration) -> Duration {
    let start = Instant::now();
    if !d.is_zero() {
        thread::sleep(d);
    }
    start.elapsed()
}

/// One sampling-round sleep: twice the base interval minus a random
/// fraction of it, so rounds never fall into lock-step with the program.
pub fn randomized_round<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    let base_ns = duration_ns(base).max(1) as u64;
    let jitter = rng.gen_range(0..base_ns);
    Duration::from_nanos(2 * base_ns - jitter)
}

/// Saturating nanosecond count
#[inline]
pub fn duration_ns(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
