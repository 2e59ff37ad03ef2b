//! Configuration for the workload emulator.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `SIM__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration structures,
//! for example `SIM__HTTP_ADDR=0.0.0.0:8080` or `SIM__LOGGING__LEVEL=debug`.
//!
//! The same configuration in YAML:
//!
//! ```yaml
//! http_addr: 0.0.0.0:8080
//! logging:
//!   level: debug
//! ```

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracexec_log::Logging;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "SIM__";

/// Newtype around `String` that protects against accidental logging of secrets in our
/// configuration struct. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Configuration of the async runtime.
///
/// The busy phase of every call runs on the blocking thread pool, so `max_blocking_threads` bounds
/// how many calls can spin at the same time. Calls beyond that queue up and report a longer total
/// elapsed time.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// Defaults to the number of CPU cores. Environment variable: `SIM__RUNTIME__WORKER_THREADS`.
    pub worker_threads: usize,

    /// Maximum number of threads running emulated workloads.
    ///
    /// Defaults to `512`. Environment variable: `SIM__RUNTIME__MAX_BLOCKING_THREADS`.
    pub max_blocking_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            max_blocking_threads: 512,
        }
    }
}

/// [Sentry](https://sentry.io/) error tracking configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN. `SIM__SENTRY__DSN`.
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name for this deployment. `SIM__SENTRY__ENVIRONMENT`.
    pub environment: Option<Cow<'static, str>>,

    /// Error event sampling rate, defaults to `1.0`.
    pub sample_rate: f32,

    /// Performance trace sampling rate, defaults to `0.01`.
    pub traces_sample_rate: f32,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
        }
    }
}

/// Main configuration struct for the workload emulator.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server bind address.
    ///
    /// # Default
    ///
    /// `0.0.0.0:8080`
    ///
    /// # Environment Variable
    ///
    /// `SIM__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// Backlog of the listen socket.
    ///
    /// Replayed traces open many connections at the same instant. Connects beyond the backlog are
    /// refused or retried by the client's kernel, which shows up as dispatch latency.
    ///
    /// Defaults to `4096`. Environment variable: `SIM__LISTEN_BACKLOG`.
    pub listen_backlog: u32,

    /// Configuration of the internal task runtime.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry error tracking configuration.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            listen_backlog: 4096,
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if environment variables
    /// contain invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SIM__HTTP_ADDR", "127.0.0.1:9999");
            jail.set_env("SIM__RUNTIME__MAX_BLOCKING_THREADS", "64");
            jail.set_env("SIM__LISTEN_BACKLOG", "128");
            jail.set_env("SIM__LOGGING__LEVEL", "debug");
            jail.set_env("SIM__SENTRY__DSN", "abcde");

            let config = Config::load(None).unwrap();

            assert_eq!(config.http_addr, "127.0.0.1:9999".parse().unwrap());
            assert_eq!(config.runtime.max_blocking_threads, 64);
            assert_eq!(config.listen_backlog, 128);
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert!(config.sentry.is_enabled());
            assert_eq!(config.sentry.dsn.unwrap().expose_secret().as_str(), "abcde");

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            http_addr: 127.0.0.1:7000
            runtime:
                worker_threads: 3
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("SIM__HTTP_ADDR", "127.0.0.1:7001");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // Env should overwrite the yaml config
            assert_eq!(config.http_addr, "127.0.0.1:7001".parse().unwrap());
            assert_eq!(config.runtime.worker_threads, 3);
            assert!(!config.sentry.is_enabled());

            Ok(())
        });
    }
}
