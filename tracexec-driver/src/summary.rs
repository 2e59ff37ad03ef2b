//! Aggregate metrics of a replay run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use yansi::Paint;

/// Counters and timing distributions collected while a run is in flight.
///
/// Shared by all dispatch tasks.
pub struct RunMetrics {
    scheduled: u64,
    released: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    jitter: Mutex<DDSketch>,
    round_trip: Mutex<DDSketch>,
}

impl fmt::Debug for RunMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunMetrics")
            .field("scheduled", &self.scheduled)
            .field("released", &self.released)
            .field("succeeded", &self.succeeded)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl RunMetrics {
    /// Creates metrics for a run of `scheduled` dispatches.
    pub fn new(scheduled: usize) -> Self {
        Self {
            scheduled: scheduled as u64,
            released: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            jitter: Mutex::new(DDSketch::default()),
            round_trip: Mutex::new(DDSketch::default()),
        }
    }

    /// Counts a released dispatch and its jitter.
    pub fn record_release(&self, jitter_ns: i64) {
        self.released.fetch_add(1, Ordering::Relaxed);
        self.jitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(jitter_ns.max(0) as f64 / 1e9);
    }

    /// Counts a successful call and its round-trip time.
    pub fn record_success(&self, round_trip: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.round_trip
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(round_trip.as_secs_f64());
    }

    /// Counts a failed call.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes the collected metrics, leaving the distributions empty.
    pub fn summary(&self, duration: Duration) -> RunSummary {
        RunSummary {
            duration,
            scheduled: self.scheduled,
            released: self.released.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            jitter: take_sketch(&self.jitter),
            round_trip: take_sketch(&self.round_trip),
        }
    }
}

fn take_sketch(sketch: &Mutex<DDSketch>) -> DDSketch {
    std::mem::take(&mut *sketch.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Final metrics of a run.
pub struct RunSummary {
    /// Time from the epoch until the last call completed.
    pub duration: Duration,
    /// Number of dispatches in the schedule.
    pub scheduled: u64,
    /// Number of dispatches released by the scheduler.
    pub released: u64,
    /// Number of successful calls.
    pub succeeded: u64,
    /// Number of failed calls.
    pub failed: u64,
    /// Dispatch jitter in seconds.
    pub jitter: DDSketch,
    /// Round-trip time of successful calls in seconds.
    pub round_trip: DDSketch,
}

impl fmt::Debug for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSummary")
            .field("duration", &self.duration)
            .field("scheduled", &self.scheduled)
            .field("released", &self.released)
            .field("succeeded", &self.succeeded)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl RunSummary {
    /// Prints the summary to standard output.
    pub fn print(&self) {
        println!();
        print!(
            "{} ({} scheduled, {} released",
            "## REPLAY".bold(),
            self.scheduled.bold(),
            self.released.bold()
        );
        if self.failed > 0 {
            print!(", {}", format!("{} FAILURES", self.failed).bold().red());
        }
        println!(") in {:.2?}", self.duration.bold());

        if self.jitter.count() > 0 {
            println!("{}", "JITTER:".bold().green());
            print_percentiles(&self.jitter, Duration::from_secs_f64);
        }
        if self.round_trip.count() > 0 {
            println!(
                "{} ({} ok)",
                "ROUND TRIP:".bold().green(),
                self.succeeded.bold()
            );
            print_percentiles(&self.round_trip, Duration::from_secs_f64);
        }
    }
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let quantile = |q| map(sketch.quantile(q).ok().flatten().unwrap_or_default());
    let avg = map(sketch.sum().unwrap_or_default() / sketch.count() as f64);
    let p50 = quantile(0.5);
    let p90 = quantile(0.9);
    let p99 = quantile(0.99);
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}
