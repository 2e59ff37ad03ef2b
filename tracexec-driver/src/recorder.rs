//! Append-only journals of a replay run.
//!
//! A run writes three journals into the output directory, named after the epoch:
//!
//!  - `<begin>.out`: one line per successful call,
//!  - `<begin>.err`: one line per failed call or fatal condition,
//!  - `<begin>.dbg`: dispatch lifecycle events, if enabled.
//!
//! Every line is `<timestamp>\t[<elapsed ns>\t]<json>`. The elapsed column is present once the
//! experiment has reached its epoch. When a journal cannot be opened or written, its lines go to
//! standard output instead and the run continues.

use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{DispatchError, ErrorClass, InvocationResult};
use crate::epoch::Epoch;

/// Payload of an error journal line.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorEvent {
    /// Always `true`; distinguishes error lines from success lines when journals are merged.
    pub error: bool,
    /// Whether the error terminates the run.
    pub exit: bool,
    /// Description of the error including its causes.
    pub arg: String,
    /// The record the error belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Delivery or protocol error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<ErrorClass>,
    /// HTTP status code, if a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl ErrorEvent {
    /// An error not tied to a record.
    pub fn new(arg: impl Into<String>, exit: bool) -> Self {
        Self {
            error: true,
            exit,
            arg: arg.into(),
            rid: None,
            class: None,
            code: None,
        }
    }

    /// A failed call of `record_id`.
    pub fn dispatch(record_id: &str, error: &DispatchError, exit: bool) -> Self {
        Self {
            rid: Some(record_id.to_owned()),
            class: Some(error.class()),
            code: error.status().map(|status| status.as_u16()),
            ..Self::new(error.chain(), exit)
        }
    }
}

#[derive(Debug)]
struct Journal {
    name: &'static str,
    path: PathBuf,
    writer: Mutex<Option<LineWriter<File>>>,
}

impl Journal {
    fn open(name: &'static str, path: PathBuf) -> Self {
        let file = OpenOptions::new().create(true).append(true).open(&path);
        let writer = match file {
            Ok(file) => Some(LineWriter::new(file)),
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    path = %path.display(),
                    "failed to open {name} journal, writing to stdout"
                );
                None
            }
        };

        Self {
            name,
            path,
            writer: Mutex::new(writer),
        }
    }

    fn write(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = writer.as_mut() {
            match writeln!(file, "{line}") {
                Ok(()) => return,
                Err(error) => {
                    tracing::error!(
                        error = &error as &dyn std::error::Error,
                        path = %self.path.display(),
                        "failed to write {} journal, writing to stdout",
                        self.name
                    );
                    *writer = None;
                }
            }
        }

        println!("[{}] {line}", self.name);
    }

    fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Err(error)) = writer.as_mut().map(|file| file.flush()) {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "failed to flush {} journal",
                self.name
            );
        }
    }
}

/// Serialized writer of the success, error and debug journals.
///
/// Each journal is guarded by its own lock, so lines are never interleaved.
#[derive(Debug)]
pub struct Recorder {
    epoch: Arc<Epoch>,
    success: Journal,
    errors: Journal,
    debug: Option<Journal>,
    fatal: CancellationToken,
}

impl Recorder {
    /// Opens the journals for a run.
    ///
    /// Creates the output directory if needed. Writing a fatal error cancels `fatal`. The debug
    /// journal is only opened if debug events are enabled.
    pub fn open(config: &Config, epoch: Arc<Epoch>, fatal: CancellationToken) -> Self {
        if let Err(error) = fs::create_dir_all(&config.out_dir) {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                path = %config.out_dir.display(),
                "failed to create output directory"
            );
        }

        Self {
            epoch,
            success: Journal::open("out", config.journal_path("out")),
            errors: Journal::open("err", config.journal_path("err")),
            debug: config
                .debug_events
                .then(|| Journal::open("dbg", config.journal_path("dbg"))),
            fatal,
        }
    }

    /// Paths of the success, error and debug journals.
    pub fn paths(&self) -> (&Path, &Path, Option<&Path>) {
        (
            &self.success.path,
            &self.errors.path,
            self.debug.as_ref().map(|journal| journal.path.as_path()),
        )
    }

    /// Records a successful call.
    pub fn success(&self, result: &InvocationResult) {
        self.success.write(&self.line(result));
    }

    /// Records an error. A fatal error cancels the run after it has been written.
    pub fn error(&self, event: &ErrorEvent) {
        self.errors.write(&self.line(event));

        if event.exit {
            tracing::error!(error = %event.arg, "fatal error, terminating run");
            self.errors.flush();
            self.fatal.cancel();
        }
    }

    /// Records a debug event, if the debug journal is enabled.
    pub fn debug<T: Serialize>(&self, event: &T) {
        if let Some(journal) = &self.debug {
            journal.write(&self.line(event));
        }
    }

    /// Flushes all journals.
    pub fn flush(&self) {
        self.success.flush();
        self.errors.flush();
        if let Some(journal) = &self.debug {
            journal.flush();
        }
    }

    fn line<T: Serialize>(&self, payload: &T) -> String {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        let payload = serde_json::to_string(payload).unwrap_or_else(|error| {
            serde_json::json!({
                "error": true,
                "exit": false,
                "arg": format!("failed to encode journal payload: {error}"),
            })
            .to_string()
        });

        match self.epoch.elapsed_ns() {
            elapsed if elapsed >= 0 => format!("{timestamp}\t{elapsed}\t{payload}"),
            _ => format!("{timestamp}\t{payload}"),
        }
    }
}
