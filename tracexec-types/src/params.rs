//! Query parameters of an emulator call.
//!
//! The parameters travel as a URL query string:
//!
//!  - `cl`: client or run identifier. Without it the call is a probe and does no work.
//!  - `id`: record id, echoed back for correlation.
//!  - `fid`: function id.
//!  - `t0`: arrival offset of the record in nanoseconds, echoed back for correlation.
//!  - `ts`: target idle (sleep) duration in nanoseconds.
//!  - `tb`: target busy duration in nanoseconds.
//!  - `it`: target iteration count. Takes precedence over `tb` when both are present.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw query parameters of an emulator call, as they appear on the wire.
///
/// All values are kept as strings so that the emulator can tell a missing parameter apart from a
/// malformed one. Use [`validate`](Self::validate) to turn them into a [`WorkloadRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadParams {
    /// Client or run identifier (`cl`).
    #[serde(rename = "cl", default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Record id (`id`).
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Function id (`fid`).
    #[serde(rename = "fid", default, skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,
    /// Arrival offset in nanoseconds (`t0`).
    #[serde(rename = "t0", default, skip_serializing_if = "Option::is_none")]
    pub arrival_offset: Option<String>,
    /// Target idle duration in nanoseconds (`ts`).
    #[serde(rename = "ts", default, skip_serializing_if = "Option::is_none")]
    pub sleep: Option<String>,
    /// Target busy duration in nanoseconds (`tb`).
    #[serde(rename = "tb", default, skip_serializing_if = "Option::is_none")]
    pub busy: Option<String>,
    /// Target iteration count (`it`).
    #[serde(rename = "it", default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<String>,
}

impl WorkloadParams {
    /// Creates the parameters for a full emulator call.
    pub fn new(
        client: impl Into<String>,
        record_id: impl Into<String>,
        function_id: impl Into<String>,
        arrival_offset: Duration,
        sleep: Duration,
        busy: Busy,
    ) -> Self {
        let (busy, iterations) = match busy {
            Busy::Duration(duration) => (Some(nanos(duration)), None),
            Busy::Iterations(count) => (None, Some(count.to_string())),
        };

        Self {
            client: Some(client.into()),
            record_id: Some(record_id.into()),
            function_id: Some(function_id.into()),
            arrival_offset: Some(nanos(arrival_offset)),
            sleep: Some(nanos(sleep)),
            busy,
            iterations,
        }
    }

    /// Collects the parameters from decoded query pairs.
    ///
    /// The first occurrence of a key wins. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "cl" => &mut params.client,
                "id" => &mut params.record_id,
                "fid" => &mut params.function_id,
                "t0" => &mut params.arrival_offset,
                "ts" => &mut params.sleep,
                "tb" => &mut params.busy,
                "it" => &mut params.iterations,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        params
    }

    /// Validates the parameters into a request the emulator can execute.
    ///
    /// A missing `cl` yields [`WorkloadRequest::Probe`] regardless of the other parameters.
    /// Otherwise `ts` is required, along with one of `it` or `tb`. Negative durations are accepted
    /// and treated as zero.
    pub fn validate(&self) -> Result<WorkloadRequest, ParamError> {
        if self.client.is_none() {
            return Ok(WorkloadRequest::Probe);
        }

        let sleep = parse_nanos("ts", self.sleep.as_deref())?;
        let busy = match self.iterations.as_deref() {
            Some(value) => Busy::Iterations(
                value
                    .trim()
                    .parse()
                    .map_err(|_| ParamError::malformed("it", value))?,
            ),
            None => Busy::Duration(parse_nanos("tb", self.busy.as_deref())?),
        };

        Ok(WorkloadRequest::Run(WorkloadSpec {
            record_id: self.record_id.clone(),
            sleep,
            busy,
        }))
    }
}

fn nanos(duration: Duration) -> String {
    duration.as_nanos().to_string()
}

fn parse_nanos(name: &'static str, value: Option<&str>) -> Result<Duration, ParamError> {
    let value = value.ok_or(ParamError::Missing(name))?;
    let nanos: i64 = value
        .trim()
        .parse()
        .map_err(|_| ParamError::malformed(name, value))?;
    Ok(Duration::from_nanos(nanos.max(0) as u64))
}

/// How the busy phase of a call is bounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Busy {
    /// Spin until the measured elapsed time reaches the duration.
    Duration(Duration),
    /// Spin for exactly this many iterations.
    Iterations(u64),
}

impl Default for Busy {
    fn default() -> Self {
        Busy::Duration(Duration::ZERO)
    }
}

/// A validated emulator call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkloadRequest {
    /// Health probe: answer with an empty `200` and do no timing work.
    Probe,
    /// Run the idle phase followed by the busy phase.
    Run(WorkloadSpec),
}

/// Target timings of a single emulator call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// The record id, if the caller sent one.
    pub record_id: Option<String>,
    /// Target idle duration.
    pub sleep: Duration,
    /// Bound of the busy phase.
    pub busy: Busy,
}

/// Errors from validating [`WorkloadParams`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParamError {
    /// A required parameter is absent.
    #[error("missing '{0}' parameter")]
    Missing(&'static str),
    /// A parameter is not a valid integer.
    #[error("bad '{name}' parameter: {value:?}")]
    Malformed {
        /// The parameter name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

impl ParamError {
    fn malformed(name: &'static str, value: &str) -> Self {
        ParamError::Malformed {
            name,
            value: value.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> WorkloadParams {
        serde_urlencoded::from_str(raw).unwrap()
    }

    #[test]
    fn test_probe_without_client() {
        assert_eq!(query("").validate(), Ok(WorkloadRequest::Probe));
        // Everything else is ignored, even garbage.
        assert_eq!(query("ts=abc&tb=1").validate(), Ok(WorkloadRequest::Probe));
    }

    #[test]
    fn test_first_value_wins() {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str("id=a&id=b&cl=x&cl=y&ts=1&tb=2&zz=3").unwrap();
        let params = WorkloadParams::from_pairs(pairs);

        assert_eq!(params.record_id.as_deref(), Some("a"));
        assert_eq!(params.client.as_deref(), Some("x"));
        assert_eq!(params.busy.as_deref(), Some("2"));

        let pairs = [("id", "a"), ("id", "b")];
        let params = WorkloadParams::from_pairs(pairs);
        assert_eq!(params.validate(), Ok(WorkloadRequest::Probe));
    }

    #[test]
    fn test_duration_mode() {
        let request = query("cl=x&id=R1&ts=750000000&tb=250000000").validate();
        assert_eq!(
            request,
            Ok(WorkloadRequest::Run(WorkloadSpec {
                record_id: Some("R1".into()),
                sleep: Duration::from_millis(750),
                busy: Busy::Duration(Duration::from_millis(250)),
            }))
        );
    }

    #[test]
    fn test_iterations_take_precedence() {
        let Ok(WorkloadRequest::Run(spec)) = query("cl=x&ts=0&tb=100&it=42").validate() else {
            panic!("expected a run request");
        };
        assert_eq!(spec.busy, Busy::Iterations(42));
    }

    #[test]
    fn test_missing_busy_bound() {
        let err = query("cl=x&ts=10").validate().unwrap_err();
        assert_eq!(err, ParamError::Missing("tb"));

        let err = query("cl=x&tb=10").validate().unwrap_err();
        assert_eq!(err, ParamError::Missing("ts"));
    }

    #[test]
    fn test_malformed_values() {
        let err = query("cl=x&ts=1.5&tb=10").validate().unwrap_err();
        assert!(matches!(err, ParamError::Malformed { name: "ts", .. }));

        let err = query("cl=x&ts=1&it=-3").validate().unwrap_err();
        assert!(matches!(err, ParamError::Malformed { name: "it", .. }));
    }

    #[test]
    fn test_negative_durations_are_zero() {
        let Ok(WorkloadRequest::Run(spec)) = query("cl=x&ts=-5&tb=-1").validate() else {
            panic!("expected a run request");
        };
        assert_eq!(spec.sleep, Duration::ZERO);
        assert_eq!(spec.busy, Busy::Duration(Duration::ZERO));
    }

    #[test]
    fn test_new_serializes_exactly_one_bound() {
        let params = WorkloadParams::new(
            "tracexec",
            "R1",
            "F1",
            Duration::from_secs(2),
            Duration::from_millis(750),
            Busy::Iterations(1000),
        );
        let encoded = serde_urlencoded::to_string(&params).unwrap();
        assert_eq!(
            encoded,
            "cl=tracexec&id=R1&fid=F1&t0=2000000000&ts=750000000&it=1000"
        );
        assert!(params.validate().is_ok());
    }
}
