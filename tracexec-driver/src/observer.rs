//! Hooks into the lifecycle of a dispatch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tracexec_types::report::saturating_nanos;

use crate::dispatch::DispatchError;
use crate::recorder::Recorder;
use crate::scheduler::Release;

/// Receives lifecycle events of every dispatch.
///
/// All methods default to doing nothing. Implementations are called from the dispatch path and
/// must return quickly.
pub trait DispatchObserver: fmt::Debug + Send + Sync {
    /// The dispatch task was spawned and waits for `offset`.
    fn scheduled(&self, _record_id: &str, _offset: Duration) {}

    /// The dispatch was released.
    fn released(&self, _record_id: &str, _release: &Release) {}

    /// The response status and headers arrived.
    fn response_headers(&self, _record_id: &str, _status: StatusCode) {}

    /// The full response body arrived.
    fn body_received(&self, _record_id: &str, _bytes: usize) {}

    /// The dispatch failed.
    fn failed(&self, _record_id: &str, _error: &DispatchError) {}
}

/// Ignores all events.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}

/// Writes every event to the debug journal.
#[derive(Debug)]
pub struct JournalObserver {
    recorder: Arc<Recorder>,
}

impl JournalObserver {
    /// Creates an observer writing to the debug journal of `recorder`.
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }
}

impl DispatchObserver for JournalObserver {
    fn scheduled(&self, record_id: &str, offset: Duration) {
        self.recorder.debug(&json!({
            "event": "scheduled",
            "rid": record_id,
            "t0": saturating_nanos(offset),
        }));
    }

    fn released(&self, record_id: &str, release: &Release) {
        self.recorder.debug(&json!({
            "event": "released",
            "rid": record_id,
            "jitter": release.jitter_ns,
            "spin": release.spin_overshoot_ns,
        }));
    }

    fn response_headers(&self, record_id: &str, status: StatusCode) {
        self.recorder.debug(&json!({
            "event": "response-headers",
            "rid": record_id,
            "code": status.as_u16(),
        }));
    }

    fn body_received(&self, record_id: &str, bytes: usize) {
        self.recorder.debug(&json!({
            "event": "body-received",
            "rid": record_id,
            "bytes": bytes,
        }));
    }

    fn failed(&self, record_id: &str, error: &DispatchError) {
        self.recorder.debug(&json!({
            "event": "failed",
            "rid": record_id,
            "error": error.chain(),
        }));
    }
}
