//! Configuration for the replay driver.
//!
//! Configuration is resolved once at startup and passed by reference to every component. It can be
//! loaded from multiple sources with the following precedence (highest to lowest):
//!
//! 1. Environment variables prefixed with `TX__`, using `__` to denote nesting
//! 2. The short legacy environment variables (`TRACE`, `DUTY`, `URL`, `BEGIN`,
//!    `DBGFUNC`, `OUTDIR`, `INITRID`, `ENDRID`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! ```yaml
//! trace: invokes.csv
//! duty_cycle: 0.25
//! url: http://10.0.0.1:10080/
//! begin_at: 2024-05-01T12:00:00Z
//! initial_offset: first-record
//! spin:
//!   slots: 8
//!   lead: 2ms
//! ```

use std::path::{Path, PathBuf};
use std::thread::available_parallelism;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracexec_log::{Logging, display_fromstr};

use crate::epoch::InitialOffset;
use crate::plan::DutyPolicy;
use crate::trace::RecordRange;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "TX__";

/// Short environment variable names and the fields they map to.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TRACE", "trace"),
    ("DUTY", "duty_cycle"),
    ("URL", "url"),
    ("BEGIN", "begin_at"),
    ("DBGFUNC", "debug_function"),
    ("OUTDIR", "out_dir"),
    ("INITRID", "first_record"),
    ("ENDRID", "last_record"),
];

/// Name-based routing of calls to per-function endpoints.
///
/// Every call goes to the same base URL, but its `Host` header is
/// `<function_prefix><function id><host_suffix>`, so that an ingress can route it to the
/// endpoint of that function.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Routing {
    /// Prepended to the function id. Defaults to `simtask-`.
    pub function_prefix: String,
    /// Appended to the function id. Defaults to `.default.knative.dev`.
    pub host_suffix: String,
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            function_prefix: "simtask-".to_owned(),
            host_suffix: ".default.knative.dev".to_owned(),
        }
    }
}

/// Bounds for the spin-wait in front of every dispatch.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Spin {
    /// Maximum number of dispatches spin-waiting at the same time.
    ///
    /// Every spinning dispatch occupies one CPU core. When more records are due at once, the
    /// surplus waits for a slot and fires late, which shows up as dispatch jitter.
    ///
    /// Defaults to the number of available processing units.
    pub slots: usize,

    /// How long before its arrival offset a dispatch stops sleeping and starts spinning.
    ///
    /// Must cover the wake-up latency of the async timer. Defaults to `2ms`.
    #[serde(with = "humantime_serde")]
    pub lead: Duration,
}

impl Default for Spin {
    fn default() -> Self {
        Self {
            slots: available_parallelism().map_or(1, |n| n.get()),
            lead: Duration::from_millis(2),
        }
    }
}

/// HTTP client settings.
///
/// Emulated workloads can run for minutes, so all timeouts are generous by default.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Http {
    /// Timeout for establishing a connection. Defaults to `18m`.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for a whole call including the response body. Defaults to `18m`.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// TCP keepalive interval. Defaults to `15s`.
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Duration,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(18 * 60),
            request_timeout: Duration::from_secs(18 * 60),
            tcp_keepalive: Duration::from_secs(15),
        }
    }
}

/// Main configuration struct for the replay driver.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Path to the trace file. Defaults to `invokes.csv`.
    pub trace: PathBuf,

    /// Fraction of each record's duration spent busy. Defaults to `0.25`.
    pub duty_cycle: f64,

    /// What to do with a duty cycle outside `[0, 1]`. Defaults to `reject`.
    pub duty_policy: DutyPolicy,

    /// Base URL every call is sent to.
    pub url: String,

    /// The experiment epoch all arrival offsets are relative to.
    ///
    /// Must not lie in the past at startup. Defaults to the start of the current minute plus two
    /// minutes.
    pub begin_at: DateTime<Utc>,

    /// Routes every call to this one function instead of the record's function.
    ///
    /// The record's function id is still sent in the `fid` parameter.
    pub debug_function: Option<String>,

    /// Directory for the success, error and debug journals. Defaults to `logs`.
    pub out_dir: PathBuf,

    /// Index of the first record to replay, counting from zero after the header.
    pub first_record: u64,

    /// Index of the last record to replay, inclusive. Negative means up to the end of the trace.
    pub last_record: i64,

    /// Identifier sent in the `cl` parameter of every call.
    pub client_id: String,

    /// Offset added to the experiment elapsed time. Defaults to `none`.
    ///
    /// Accepts `none`, `first-record`, or a duration such as `90s`.
    #[serde(with = "display_fromstr")]
    pub initial_offset: InitialOffset,

    /// Sends this iteration count instead of a busy duration with every call.
    pub iterations: Option<u64>,

    /// Name-based routing of calls.
    pub routing: Routing,

    /// Bounds for the spin-wait before dispatch.
    pub spin: Spin,

    /// HTTP client settings.
    pub http: Http,

    /// Writes connection lifecycle events to the debug journal.
    pub debug_events: bool,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        let now = Utc::now();
        let minute = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);

        Self {
            trace: PathBuf::from("invokes.csv"),
            duty_cycle: 0.25,
            duty_policy: DutyPolicy::default(),
            url: "http://127.0.0.1:8080/".to_owned(),
            begin_at: minute + TimeDelta::minutes(2),
            debug_function: None,
            out_dir: PathBuf::from("logs"),
            first_record: 0,
            last_record: -1,
            client_id: concat!("tracexec-", env!("CARGO_PKG_VERSION")).to_owned(),
            initial_offset: InitialOffset::None,
            iterations: None,
            routing: Routing::default(),
            spin: Spin::default(),
            http: Http::default(),
            debug_events: false,
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if environment variables
    /// contain invalid values, such as an unparseable duty cycle or begin time.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(legacy_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// The inclusive range of records to replay.
    pub fn record_range(&self) -> RecordRange {
        RecordRange {
            first: self.first_record as usize,
            last: usize::try_from(self.last_record).ok(),
        }
    }

    /// The function that receives every call, if overridden.
    pub fn debug_function(&self) -> Option<&str> {
        self.debug_function.as_deref().filter(|f| !f.is_empty())
    }

    /// Path of the journal with the given extension, named after the epoch.
    pub fn journal_path(&self, extension: &str) -> PathBuf {
        let name = self.begin_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        self.out_dir.join(format!("{name}.{extension}"))
    }
}

fn legacy_env() -> Env {
    Env::raw().filter_map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(legacy, _)| key.as_str().eq_ignore_ascii_case(legacy))
            .map(|(_, field)| (*field).into())
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.duty_cycle, 0.25);
            assert_eq!(config.trace, Path::new("invokes.csv"));
            assert_eq!(config.record_range(), RecordRange { first: 0, last: None });
            assert!(config.begin_at > Utc::now());
            assert!(config.spin.slots >= 1);
            assert_eq!(config.initial_offset, InitialOffset::None);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_legacy_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRACE", "/data/trace.csv");
            jail.set_env("DUTY", "0.5");
            jail.set_env("URL", "http://10.0.0.1:10080/");
            jail.set_env("BEGIN", "2030-01-02T03:04:05Z");
            jail.set_env("DBGFUNC", "");
            jail.set_env("INITRID", "10");
            jail.set_env("ENDRID", "20");

            let config = Config::load(None).unwrap();

            assert_eq!(config.trace, Path::new("/data/trace.csv"));
            assert_eq!(config.duty_cycle, 0.5);
            assert_eq!(config.url, "http://10.0.0.1:10080/");
            assert_eq!(config.begin_at.to_rfc3339(), "2030-01-02T03:04:05+00:00");
            assert_eq!(config.debug_function(), None);
            assert_eq!(
                config.record_range(),
                RecordRange {
                    first: 10,
                    last: Some(20)
                }
            );
            assert_eq!(
                config.journal_path("out"),
                Path::new("logs/2030-01-02T03:04:05Z.out")
            );

            Ok(())
        });
    }

    #[test]
    fn prefixed_env_wins() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DUTY", "0.5");
            jail.set_env("TX__DUTY_CYCLE", "0.75");
            jail.set_env("TX__SPIN__LEAD", "5ms");
            jail.set_env("TX__INITIAL_OFFSET", "first-record");

            let config = Config::load(None).unwrap();

            assert_eq!(config.duty_cycle, 0.75);
            assert_eq!(config.spin.lead, Duration::from_millis(5));
            assert_eq!(config.initial_offset, InitialOffset::FirstRecord);

            Ok(())
        });
    }

    #[test]
    fn unparseable_values_fail() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DUTY", "a quarter");
            assert!(Config::load(None).is_err());

            jail.set_env("DUTY", "0.25");
            jail.set_env("BEGIN", "tomorrow");
            assert!(Config::load(None).is_err());

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            trace: trace.csv
            debug_function: simtask-debug
            iterations: 1000
            initial_offset: 90s
            routing:
                function_prefix: fn-
                host_suffix: .example.com
            http:
                request_timeout: 5m
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.debug_function(), Some("simtask-debug"));
            assert_eq!(config.iterations, Some(1000));
            assert_eq!(
                config.initial_offset,
                InitialOffset::Fixed(Duration::from_secs(90))
            );
            assert_eq!(config.routing.function_prefix, "fn-");
            assert_eq!(config.http.request_timeout, Duration::from_secs(300));
            assert_eq!(config.http.tcp_keepalive, Duration::from_secs(15));

            Ok(())
        });
    }
}
