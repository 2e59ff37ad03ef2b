//! Logging configuration and setup shared by the `tracexec` binaries.
//!
//! Both the replay driver and the workload emulator log through [`tracing`] to stderr. The
//! [`Logging`] block is embedded in each binary's configuration, and [`init`] or [`init_with`]
//! installs the global subscriber from it.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::env;
use std::fmt;
use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::Identity;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32.123456Z  INFO tracexec_driver::replay: requests pre-generated
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

impl LogFormat {
    /// Resolves [`LogFormat::Auto`] against the current stderr.
    pub fn resolve(self) -> Self {
        match self {
            LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
            LogFormat::Auto => LogFormat::Simplified,
            format => format,
        }
    }
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::error::Error for FormatParseError {}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

/// Serde adapter for types that round-trip through `Display` and `FromStr`.
pub mod display_fromstr {
    /// Serializes `value` with its `Display` implementation.
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    /// Deserializes a string and parses it with `FromStr`.
    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Controls the verbosity and format of log output. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Valid levels in increasing severity: TRACE, DEBUG, INFO, WARN, ERROR, OFF. The `RUST_LOG`
    /// environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Installs the global tracing subscriber for `logging`.
pub fn init(logging: &Logging) {
    init_with(logging, None::<Identity>);
}

/// Installs the global tracing subscriber for `logging`, with an additional layer.
///
/// The extra layer sees every event regardless of the configured level, which lets integrations
/// such as error reporting apply their own filtering.
pub fn init_with<L>(logging: &Logging, extra: Option<L>)
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let (level, env_filter) = parse_rust_log(logging.level);

    tracing_subscriber::registry()
        .with(extra)
        .with(format_layer(logging.format).with_filter(level))
        .with(env_filter)
        .init();
}

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    match format.resolve() {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .boxed(),
        LogFormat::Simplified | LogFormat::Auto => layer.with_ansi(false).boxed(),
    }
}

/// Resolves the effective level and filter directives.
///
/// If `RUST_LOG` is a plain level, it overrides `level` and the default directives apply.
/// Otherwise it is used literally, for users who know which overrides they want.
pub fn parse_rust_log(level: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => level,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        tower_http=TRACE,\
        tracexec_types=TRACE,\
        tracexec_server=TRACE,\
        tracexec_driver=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Auto);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("colorful".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_resolve_keeps_explicit_format() {
        assert_eq!(LogFormat::Json.resolve(), LogFormat::Json);
        assert_ne!(LogFormat::Auto.resolve(), LogFormat::Auto);
    }

    #[test]
    fn test_logging_serde() {
        let logging: Logging =
            serde_json::from_str(r#"{"level":"debug","format":"json"}"#).unwrap();
        assert_eq!(logging.level, LevelFilter::DEBUG);
        assert_eq!(logging.format, LogFormat::Json);

        let json = serde_json::to_string(&Logging::default()).unwrap();
        let logging: Logging = serde_json::from_str(&json).unwrap();
        assert_eq!(logging.level, LevelFilter::INFO);
        assert_eq!(logging.format, LogFormat::Auto);
    }
}
