//! Emulation of a compute task with a target duration.
//!
//! Each call goes through an idle phase, where the thread sleeps for the target sleep duration,
//! followed by a busy phase, where it spins until the target busy duration or iteration count is
//! reached. Both phases are measured on the monotonic clock and reported together with wall-clock
//! timestamps in a [`WorkloadReport`].

use std::thread;
use std::time::{Instant, SystemTime};

use tracexec_types::report::{saturating_nanos, unix_nanos};
use tracexec_types::timing::busy_for;
use tracexec_types::{WorkloadReport, WorkloadSpec};

use crate::error::{ApiError, ApiResult};

/// The moment a request was received.
///
/// This is stamped by the outermost middleware so that the reported total elapsed time includes
/// routing and parameter extraction.
#[derive(Clone, Copy, Debug)]
pub struct Receipt {
    /// Monotonic receipt time.
    pub instant: Instant,
    /// Wall-clock receipt time.
    pub wall: SystemTime,
}

impl Receipt {
    /// Stamps the current time.
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: SystemTime::now(),
        }
    }
}

/// Runs the idle and busy phases of `spec` on the current thread.
///
/// This blocks the thread for the whole duration of the workload and keeps one CPU core busy
/// during the busy phase. In async contexts, use [`run`] instead.
pub fn emulate(receipt: Receipt, spec: &WorkloadSpec) -> WorkloadReport {
    let idle_start = Instant::now();
    if !spec.sleep.is_zero() {
        thread::sleep(spec.sleep);
    }
    let idle = idle_start.elapsed();

    let busy = busy_for(spec.busy);

    WorkloadReport {
        received_at: unix_nanos(receipt.wall),
        idle_ns: saturating_nanos(idle) as u64,
        busy_ns: saturating_nanos(busy.elapsed) as u64,
        iterations: busy.iterations,
        elapsed_ns: saturating_nanos(receipt.instant.elapsed()) as u64,
        finished_at: unix_nanos(SystemTime::now()),
    }
}

/// Runs [`emulate`] on the blocking thread pool.
pub async fn run(receipt: Receipt, spec: WorkloadSpec) -> ApiResult<WorkloadReport> {
    tokio::task::spawn_blocking(move || emulate(receipt, &spec))
        .await
        .map_err(|err| ApiError::Server(Box::new(err)))
}
