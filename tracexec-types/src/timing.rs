//! Spin-based timing primitives.
//!
//! OS timers and sleeps wake up tens of microseconds to milliseconds late, and how late is not
//! predictable. Both primitives here instead poll a clock in a tight loop and therefore occupy one
//! CPU core for as long as they run. Callers are expected to bound how many of them run at once.

use std::hint;
use std::time::{Duration, Instant};

use crate::params::Busy;

/// Spins until `clock` reports a value at or past `target`.
///
/// The clock is re-read on every iteration and never cached. Returns the overshoot, that is the
/// first observed clock value minus `target`, which is never negative.
pub fn wait_until<C>(mut clock: C, target: i64) -> i64
where
    C: FnMut() -> i64,
{
    loop {
        let now = clock();
        if now >= target {
            return now - target;
        }
        hint::spin_loop();
    }
}

/// Outcome of a [`busy_for`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusyOutcome {
    /// Measured duration of the busy phase.
    pub elapsed: Duration,
    /// Number of loop iterations performed.
    pub iterations: u64,
}

/// Burns CPU until the bound given by `busy` is reached.
///
/// In [`Busy::Duration`] mode the loop runs until its own measured elapsed time reaches the
/// target, so the reported elapsed time never undershoots it. In [`Busy::Iterations`] mode exactly
/// the requested number of iterations is performed.
pub fn busy_for(busy: Busy) -> BusyOutcome {
    let start = Instant::now();
    let mut iterations: u64 = 0;

    match busy {
        Busy::Iterations(target) => {
            while iterations < target {
                iterations = hint::black_box(iterations) + 1;
            }
        }
        Busy::Duration(target) => {
            while start.elapsed() < target {
                iterations = hint::black_box(iterations) + 1;
            }
        }
    }

    BusyOutcome {
        elapsed: start.elapsed(),
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_until_never_early() {
        let mut ticks = 0;
        let overshoot = wait_until(
            || {
                ticks += 3;
                ticks
            },
            10,
        );
        // 3, 6, 9 are early; 12 is the first value at or past the target.
        assert_eq!(ticks, 12);
        assert_eq!(overshoot, 2);
    }

    #[test]
    fn test_wait_until_already_reached() {
        assert_eq!(wait_until(|| 50, 10), 40);
    }

    #[test]
    fn test_wait_until_real_clock() {
        let start = Instant::now();
        let target = Duration::from_millis(5);
        let overshoot = wait_until(|| start.elapsed().as_nanos() as i64, target.as_nanos() as i64);
        assert!(overshoot >= 0);
        assert!(start.elapsed() >= target);
    }

    #[test]
    fn test_busy_duration_never_undershoots() {
        for millis in [0, 1, 10] {
            let target = Duration::from_millis(millis);
            let outcome = busy_for(Busy::Duration(target));
            assert!(outcome.elapsed >= target, "{outcome:?} < {target:?}");
        }
    }

    #[test]
    fn test_busy_iterations_exact() {
        let outcome = busy_for(Busy::Iterations(123_456));
        assert_eq!(outcome.iterations, 123_456);

        let outcome = busy_for(Busy::Iterations(0));
        assert_eq!(outcome.iterations, 0);
    }
}
