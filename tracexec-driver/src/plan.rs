//! Splitting recorded durations into idle and busy phases.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracexec_types::report::saturating_nanos;

use crate::trace::TraceRecord;

/// What to do with a duty cycle outside `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DutyPolicy {
    /// Refuse to start.
    #[default]
    Reject,
    /// Clamp into `[0, 1]`.
    Clamp,
    /// Use the value as given. The busy or sleep part of a plan can then be negative, which is sent
    /// as zero.
    Passthrough,
}

/// Errors from validating the duty cycle.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    /// The duty cycle lies outside `[0, 1]` and the policy rejects it.
    #[error("duty cycle {0} is outside [0, 1]")]
    OutOfRange(f64),
    /// The duty cycle is NaN or infinite.
    #[error("duty cycle {0} is not a finite number")]
    NotFinite(f64),
}

/// Fraction of a call's duration spent busy, validated against a [`DutyPolicy`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DutyCycle(f64);

impl DutyCycle {
    /// Validates `value` according to `policy`.
    pub fn new(value: f64, policy: DutyPolicy) -> Result<Self, PlanError> {
        if !value.is_finite() {
            return Err(PlanError::NotFinite(value));
        }

        let in_range = (0.0..=1.0).contains(&value);
        match policy {
            _ if in_range => Ok(Self(value)),
            DutyPolicy::Reject => Err(PlanError::OutOfRange(value)),
            DutyPolicy::Clamp => Ok(Self(value.clamp(0.0, 1.0))),
            DutyPolicy::Passthrough => Ok(Self(value)),
        }
    }

    /// The fraction as a float.
    pub fn get(self) -> f64 {
        self.0
    }

    /// Splits `total` into busy and sleep parts.
    ///
    /// The busy part is `total × duty` rounded to the nanosecond, and the sleep part is the
    /// remainder, so both always add up to `total` exactly.
    pub fn plan(self, total: Duration) -> Plan {
        let total_ns = saturating_nanos(total);
        let busy_ns = (self.0 * total_ns as f64).round() as i64;

        Plan {
            busy_ns,
            sleep_ns: total_ns - busy_ns,
        }
    }
}

/// Busy and sleep parts of a recorded duration, in signed nanoseconds.
///
/// Both parts are non-negative unless the duty cycle was passed through from outside `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    /// Planned busy duration.
    pub busy_ns: i64,
    /// Planned sleep duration.
    pub sleep_ns: i64,
}

impl Plan {
    /// The busy part, or zero if negative.
    pub fn busy(&self) -> Duration {
        Duration::from_nanos(self.busy_ns.max(0) as u64)
    }

    /// The sleep part, or zero if negative.
    pub fn sleep(&self) -> Duration {
        Duration::from_nanos(self.sleep_ns.max(0) as u64)
    }

    /// The planned total, which equals the recorded duration.
    pub fn total_ns(&self) -> i64 {
        self.busy_ns + self.sleep_ns
    }
}

/// A trace record together with its planned phases.
///
/// The dispatch instant is the experiment epoch plus [`TraceRecord::arrival_offset`].
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleEntry {
    /// The trace record.
    pub record: TraceRecord,
    /// The planned idle and busy phases.
    pub plan: Plan,
}

/// Plans every record, producing exactly one entry per record in trace order.
pub fn schedule(records: Vec<TraceRecord>, duty: DutyCycle) -> Vec<ScheduleEntry> {
    records
        .into_iter()
        .map(|record| ScheduleEntry {
            plan: duty.plan(record.total_duration),
            record,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duty(value: f64) -> DutyCycle {
        DutyCycle::new(value, DutyPolicy::Reject).unwrap()
    }

    #[test]
    fn test_quarter_of_a_second() {
        let plan = duty(0.25).plan(Duration::from_secs(1));
        assert_eq!(plan.busy(), Duration::from_millis(250));
        assert_eq!(plan.sleep(), Duration::from_millis(750));
    }

    #[test]
    fn test_conserves_duration() {
        let totals = [0, 1, 3, 7, 999_999_999, 1_234_567_891_011];
        for value in [0.0, 0.1, 1.0 / 3.0, 0.25, 0.5, 0.999, 1.0] {
            for total in totals {
                let plan = duty(value).plan(Duration::from_nanos(total));
                assert_eq!(plan.total_ns(), total as i64, "duty {value}, total {total}");
                assert_eq!(plan.busy() + plan.sleep(), Duration::from_nanos(total));
            }
        }
    }

    #[test]
    fn test_extremes() {
        let total = Duration::from_millis(1337);
        assert_eq!(duty(0.0).plan(total).busy(), Duration::ZERO);
        assert_eq!(duty(1.0).plan(total).sleep(), Duration::ZERO);
    }

    #[test]
    fn test_policies() {
        assert_eq!(
            DutyCycle::new(1.5, DutyPolicy::Reject),
            Err(PlanError::OutOfRange(1.5))
        );
        assert!(matches!(
            DutyCycle::new(f64::NAN, DutyPolicy::Passthrough),
            Err(PlanError::NotFinite(_))
        ));
        assert_eq!(DutyCycle::new(-0.5, DutyPolicy::Clamp).unwrap().get(), 0.0);
        assert_eq!(DutyCycle::new(1.5, DutyPolicy::Clamp).unwrap().get(), 1.0);

        let plan = DutyCycle::new(1.5, DutyPolicy::Passthrough)
            .unwrap()
            .plan(Duration::from_secs(1));
        assert_eq!(plan.busy_ns, 1_500_000_000);
        assert_eq!(plan.sleep_ns, -500_000_000);
        assert_eq!(plan.sleep(), Duration::ZERO);
        assert_eq!(plan.total_ns(), 1_000_000_000);
    }

    #[test]
    fn test_schedule_keeps_order() {
        let records = ["A", "B", "C"]
            .into_iter()
            .map(|id| TraceRecord {
                id: id.into(),
                arrival_offset: Duration::ZERO,
                function_id: "F".into(),
                total_duration: Duration::from_secs(1),
            })
            .collect();

        let entries = schedule(records, duty(0.5));
        let ids: Vec<_> = entries.iter().map(|e| e.record.id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
        assert!(entries.iter().all(|e| e.plan.busy() == Duration::from_millis(500)));
    }
}
