//! The experiment epoch and the elapsed-time clock derived from it.
//!
//! All arrival offsets in a trace are relative to one absolute instant, the epoch. Elapsed time
//! is measured on the monotonic clock: at construction, the wall-clock distance to the epoch is
//! converted into an [`Instant`] anchor once, and every later reading compares against that anchor.
//! Wall-clock adjustments during a run therefore do not move dispatches.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracexec_types::report::saturating_nanos;
use tracexec_types::timing;

use crate::trace::TraceRecord;

/// Errors from establishing the epoch or waiting for it.
#[derive(Debug, Error)]
pub enum EpochError {
    /// The configured epoch had already passed at startup.
    #[error("begin time {begin_at} lies in the past (now: {now})")]
    BeginInPast {
        /// The configured epoch.
        begin_at: DateTime<Utc>,
        /// Wall-clock time at the check.
        now: DateTime<Utc>,
    },
    /// The spin slots were closed while a dispatch waited for one.
    #[error("spin slots closed")]
    SlotsClosed(#[from] tokio::sync::AcquireError),
    /// The blocking task running the spin-wait panicked or was cancelled.
    #[error("spin-wait task failed")]
    Spin(#[from] tokio::task::JoinError),
}

/// Offset added to the experiment elapsed time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InitialOffset {
    /// Elapsed time starts at zero at the epoch.
    #[default]
    None,
    /// Elapsed time starts at the arrival offset of the first replayed record, so that a window
    /// taken from the middle of a trace starts right at the epoch.
    FirstRecord,
    /// Elapsed time starts at the given offset.
    Fixed(Duration),
}

impl InitialOffset {
    /// Resolves the offset against the records that will be replayed.
    pub fn resolve(self, records: &[TraceRecord]) -> Duration {
        match self {
            InitialOffset::None => Duration::ZERO,
            InitialOffset::FirstRecord => records
                .first()
                .map_or(Duration::ZERO, |record| record.arrival_offset),
            InitialOffset::Fixed(offset) => offset,
        }
    }
}

impl FromStr for InitialOffset {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "none" => Ok(InitialOffset::None),
            "first-record" => Ok(InitialOffset::FirstRecord),
            other => humantime::parse_duration(other).map(InitialOffset::Fixed),
        }
    }
}

impl fmt::Display for InitialOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialOffset::None => f.write_str("none"),
            InitialOffset::FirstRecord => f.write_str("first-record"),
            InitialOffset::Fixed(offset) => write!(f, "{}", humantime::format_duration(*offset)),
        }
    }
}

/// The shared experiment epoch.
///
/// `elapsed = now - begin_at + initial_offset`, re-evaluated on every call.
#[derive(Clone, Debug)]
pub struct Epoch {
    begin_at: DateTime<Utc>,
    anchor: Instant,
    initial_offset_ns: i64,
}

impl Epoch {
    /// Establishes the epoch at `begin_at`, which must not lie in the past.
    pub fn new(begin_at: DateTime<Utc>) -> Result<Self, EpochError> {
        let now = Utc::now();
        let instant = Instant::now();

        let until = (begin_at - now)
            .to_std()
            .map_err(|_| EpochError::BeginInPast { begin_at, now })?;

        Ok(Self {
            begin_at,
            anchor: instant + until,
            initial_offset_ns: 0,
        })
    }

    /// Folds `offset` into the elapsed time.
    pub fn with_initial_offset(mut self, offset: Duration) -> Self {
        self.initial_offset_ns = saturating_nanos(offset);
        self
    }

    /// The configured epoch.
    pub fn begin_at(&self) -> DateTime<Utc> {
        self.begin_at
    }

    /// The initial offset folded into the elapsed time.
    pub fn initial_offset(&self) -> Duration {
        Duration::from_nanos(self.initial_offset_ns as u64)
    }

    /// Nanoseconds elapsed since the epoch, plus the initial offset.
    ///
    /// Negative before the epoch.
    pub fn elapsed_ns(&self) -> i64 {
        let now = Instant::now();
        let since = match now.checked_duration_since(self.anchor) {
            Some(after) => saturating_nanos(after),
            None => -saturating_nanos(self.anchor - now),
        };
        since.saturating_add(self.initial_offset_ns)
    }

    /// The monotonic instant at which the elapsed time reaches `offset`.
    ///
    /// Offsets before the initial offset map to the epoch itself.
    pub fn instant_of(&self, offset: Duration) -> Instant {
        let shift = saturating_nanos(offset) - self.initial_offset_ns;
        self.anchor + Duration::from_nanos(shift.max(0) as u64)
    }

    /// Spins until the elapsed time reaches `offset` and returns the overshoot in nanoseconds.
    ///
    /// Occupies the calling thread for the whole wait. The result is never negative.
    pub fn wait_until(&self, offset: Duration) -> i64 {
        timing::wait_until(|| self.elapsed_ns(), saturating_nanos(offset))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_parse_initial_offset() {
        assert_eq!("none".parse::<InitialOffset>().unwrap(), InitialOffset::None);
        assert_eq!(
            "first-record".parse::<InitialOffset>().unwrap(),
            InitialOffset::FirstRecord
        );
        assert_eq!(
            "1m 30s".parse::<InitialOffset>().unwrap(),
            InitialOffset::Fixed(Duration::from_secs(90))
        );
        assert!("soon".parse::<InitialOffset>().is_err());

        let fixed = InitialOffset::Fixed(Duration::from_millis(1500));
        assert_eq!(fixed.to_string().parse::<InitialOffset>().unwrap(), fixed);
    }

    #[test]
    fn test_resolve_initial_offset() {
        let records = vec![TraceRecord {
            id: "R1".into(),
            arrival_offset: Duration::from_secs(42),
            function_id: "F1".into(),
            total_duration: Duration::ZERO,
        }];

        assert_eq!(InitialOffset::None.resolve(&records), Duration::ZERO);
        assert_eq!(
            InitialOffset::FirstRecord.resolve(&records),
            Duration::from_secs(42)
        );
        assert_eq!(InitialOffset::FirstRecord.resolve(&[]), Duration::ZERO);
    }

    #[test]
    fn test_begin_in_past() {
        let err = Epoch::new(Utc::now() - TimeDelta::seconds(1)).unwrap_err();
        assert!(matches!(err, EpochError::BeginInPast { .. }));
    }

    #[test]
    fn test_elapsed_before_and_after() {
        let epoch = Epoch::new(Utc::now() + TimeDelta::milliseconds(20)).unwrap();
        assert!(epoch.elapsed_ns() < 0);

        let overshoot = epoch.wait_until(Duration::from_millis(5));
        assert!(overshoot >= 0);
        assert!(epoch.elapsed_ns() >= 5_000_000);
        assert!(Instant::now() >= epoch.instant_of(Duration::from_millis(5)));
    }

    #[test]
    fn test_initial_offset_shifts_elapsed() {
        let epoch = Epoch::new(Utc::now() + TimeDelta::milliseconds(10))
            .unwrap()
            .with_initial_offset(Duration::from_secs(60));

        assert!(epoch.elapsed_ns() > 59_000_000_000);
        assert_eq!(
            epoch.instant_of(Duration::from_secs(10)),
            epoch.instant_of(Duration::from_secs(60))
        );

        epoch.wait_until(Duration::from_secs(60));
        assert!(epoch.elapsed_ns() >= 60_000_000_000);
    }
}
