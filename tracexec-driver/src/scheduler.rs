//! Releasing dispatches at their arrival offsets.
//!
//! A pending dispatch first sleeps on the async timer until shortly before its offset, then takes
//! one of a bounded number of spin slots and spin-waits the rest of the way on a blocking thread.
//! The slot is given back as soon as the spin ends. Jitter is measured once the dispatch path
//! resumes on the runtime, so it includes the wake-up of the task after the spin.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Semaphore;
use tracexec_types::report::saturating_nanos;

use crate::config::Spin;
use crate::epoch::{Epoch, EpochError};

/// Outcome of waiting for an arrival offset.
#[derive(Clone, Copy, Debug)]
pub struct Release {
    /// How late the dispatch path resumed, in nanoseconds. Never negative.
    pub jitter_ns: i64,
    /// How far the spin itself overshot the offset, in nanoseconds.
    pub spin_overshoot_ns: i64,
    /// Wall-clock time of the release.
    pub released_at: SystemTime,
}

/// Blocks dispatch paths until the experiment reaches their arrival offsets.
#[derive(Clone, Debug)]
pub struct Scheduler {
    epoch: Arc<Epoch>,
    slots: Arc<Semaphore>,
    lead: Duration,
}

impl Scheduler {
    /// Creates a scheduler that releases against `epoch`.
    pub fn new(epoch: Arc<Epoch>, spin: &Spin) -> Self {
        Self {
            epoch,
            slots: Arc::new(Semaphore::new(spin.slots.clamp(1, Semaphore::MAX_PERMITS))),
            lead: spin.lead,
        }
    }

    /// The epoch all offsets are relative to.
    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    /// Waits until the experiment elapsed time reaches `offset`.
    ///
    /// Never returns before `offset`. When more dispatches are due than there are spin slots, the
    /// surplus is released late, and the delay is reported as jitter.
    pub async fn release(&self, offset: Duration) -> Result<Release, EpochError> {
        let wake = self.epoch.instant_of(offset).checked_sub(self.lead);
        if let Some(wake) = wake {
            tokio::time::sleep_until(wake.into()).await;
        }

        let permit = self.slots.clone().acquire_owned().await?;
        let epoch = self.epoch.clone();
        let spin_overshoot_ns = tokio::task::spawn_blocking(move || {
            let overshoot = epoch.wait_until(offset);
            drop(permit);
            overshoot
        })
        .await?;

        let released_at = SystemTime::now();
        let jitter_ns = self.epoch.elapsed_ns() - saturating_nanos(offset);
        Ok(Release {
            jitter_ns: jitter_ns.max(0),
            spin_overshoot_ns,
            released_at,
        })
    }
}
