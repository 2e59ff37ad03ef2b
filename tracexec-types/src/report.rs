//! Telemetry returned by the emulator.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Server-measured timings of one emulator call.
///
/// Absolute timestamps are nanoseconds since the Unix epoch on the server's wall clock. Durations
/// are nanoseconds measured on the server's monotonic clock. The client subtracts these from its
/// own timestamps to derive network and scheduling overheads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadReport {
    /// Wall-clock time the request was received.
    #[serde(rename = "rt0")]
    pub received_at: i64,
    /// Measured duration of the idle phase.
    #[serde(rename = "rts")]
    pub idle_ns: u64,
    /// Measured duration of the busy phase.
    #[serde(rename = "rtb")]
    pub busy_ns: u64,
    /// Iterations performed during the busy phase.
    #[serde(rename = "rit")]
    pub iterations: u64,
    /// Total elapsed time from receipt until the report was built.
    #[serde(rename = "rdt")]
    pub elapsed_ns: u64,
    /// Wall-clock time the report was built.
    #[serde(rename = "rtf")]
    pub finished_at: i64,
}

/// Converts a wall-clock time into signed nanoseconds since the Unix epoch.
pub fn unix_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => saturating_nanos(since),
        Err(before) => -saturating_nanos(before.duration()),
    }
}

/// Converts a duration into nanoseconds, saturating at `i64::MAX`.
pub fn saturating_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let report = WorkloadReport {
            received_at: 1,
            idle_ns: 2,
            busy_ns: 3,
            iterations: 4,
            elapsed_ns: 5,
            finished_at: 6,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"{"rt0":1,"rts":2,"rtb":3,"rit":4,"rdt":5,"rtf":6}"#
        );
    }

    #[test]
    fn test_unix_nanos_before_epoch() {
        let time = UNIX_EPOCH - Duration::from_nanos(5);
        assert_eq!(unix_nanos(time), -5);
        assert_eq!(unix_nanos(UNIX_EPOCH + Duration::from_secs(1)), 1_000_000_000);
    }
}
