//! Building and sending emulator calls.
//!
//! Every call is prepared in full before the epoch, so that the only work left after release is
//! handing the request to the connection pool.

use std::error::Error as _;
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HOST};
use serde::Serialize;
use thiserror::Error;
use tracexec_types::{Busy, WorkloadParams, WorkloadReport};

use crate::config::{Config, Http};
use crate::observer::DispatchObserver;
use crate::plan::ScheduleEntry;

/// User agent sent with every call.
const USER_AGENT: &str = concat!("tracexec/", env!("CARGO_PKG_VERSION"));

/// Errors from a single emulator call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request could not be built from the record.
    #[error("failed to build request")]
    Build(#[source] reqwest::Error),
    /// The request could not be sent or no response arrived.
    #[error("request failed")]
    Network(#[source] reqwest::Error),
    /// The emulator answered with a status other than `200`.
    #[error("unexpected status {0}")]
    Status(StatusCode),
    /// The response body could not be read.
    #[error("failed to read response body")]
    Body(#[source] reqwest::Error),
    /// The response body is not a valid report.
    #[error("failed to decode response body")]
    Decode(#[from] serde_json::Error),
}

/// Coarse classification of a [`DispatchError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// The call did not produce a successful response.
    Delivery,
    /// The call succeeded, but its response could not be understood.
    Protocol,
}

impl DispatchError {
    /// Classifies the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            DispatchError::Decode(_) => ErrorClass::Protocol,
            _ => ErrorClass::Delivery,
        }
    }

    /// The HTTP status code, if a response arrived.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DispatchError::Status(status) => Some(*status),
            DispatchError::Network(err) | DispatchError::Body(err) => err.status(),
            _ => None,
        }
    }

    /// Formats the error together with all of its causes.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}

/// Creates the HTTP client shared by all calls.
///
/// Connections are reused and never evicted for idleness, and there is no limit on idle
/// connections per host.
pub fn client(http: &Http) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(http.connect_timeout)
        .timeout(http.request_timeout)
        .tcp_keepalive(http.tcp_keepalive)
        .pool_idle_timeout(None)
        .pool_max_idle_per_host(usize::MAX)
        .build()
}

/// A fully built emulator call for one schedule entry.
#[derive(Debug)]
pub struct PreparedRequest {
    /// The schedule entry the call was built from.
    pub entry: ScheduleEntry,
    /// The query parameters of the call.
    pub params: WorkloadParams,
    /// The request, ready to send.
    pub request: reqwest::Request,
}

impl PreparedRequest {
    /// Builds the call for `entry`.
    ///
    /// The `Host` header names the record's function, or the debug function if one is
    /// configured. In iteration mode the call carries `it` instead of `tb`.
    pub fn build(
        client: &reqwest::Client,
        config: &Config,
        entry: ScheduleEntry,
    ) -> Result<Self, DispatchError> {
        let record = &entry.record;
        let busy = match config.iterations {
            Some(iterations) => Busy::Iterations(iterations),
            None => Busy::Duration(entry.plan.busy()),
        };
        let params = WorkloadParams::new(
            config.client_id.as_str(),
            record.id.as_str(),
            record.function_id.as_str(),
            record.arrival_offset,
            entry.plan.sleep(),
            busy,
        );

        let host = match config.debug_function() {
            Some(function) => format!("{function}{}", config.routing.host_suffix),
            None => format!(
                "{}{}{}",
                config.routing.function_prefix, record.function_id, config.routing.host_suffix
            ),
        };

        let request = client
            .get(&config.url)
            .header(HOST, host)
            .header(CONTENT_TYPE, "text/plain")
            .header(ACCEPT, "*/*")
            .query(&params)
            .build()
            .map_err(DispatchError::Build)?;

        Ok(Self {
            entry,
            params,
            request,
        })
    }
}

/// Sends prepared calls and decodes their reports.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    client: reqwest::Client,
    observer: Arc<dyn DispatchObserver>,
}

impl Dispatcher {
    /// Creates a dispatcher that reports lifecycle events to `observer`.
    pub fn new(client: reqwest::Client, observer: Arc<dyn DispatchObserver>) -> Self {
        Self { client, observer }
    }

    /// The observer receiving lifecycle events.
    pub fn observer(&self) -> &dyn DispatchObserver {
        self.observer.as_ref()
    }

    /// Sends `request` and decodes the emulator's report.
    ///
    /// Any status other than `200` is an error. Nothing is retried.
    pub async fn send(
        &self,
        record_id: &str,
        request: reqwest::Request,
    ) -> Result<WorkloadReport, DispatchError> {
        let response = self
            .client
            .execute(request)
            .await
            .map_err(DispatchError::Network)?;

        let status = response.status();
        self.observer.response_headers(record_id, status);
        if status != StatusCode::OK {
            return Err(DispatchError::Status(status));
        }

        let body = response.bytes().await.map_err(DispatchError::Body)?;
        self.observer.body_received(record_id, body.len());

        Ok(serde_json::from_slice(&body)?)
    }
}

/// One successful call, as written to the success journal.
///
/// Merges the query parameters and the emulator's report with the client-side timestamps.
#[derive(Clone, Debug, Serialize)]
pub struct InvocationResult {
    /// The query parameters of the call.
    #[serde(flatten)]
    pub params: WorkloadParams,
    /// The emulator's report.
    #[serde(flatten)]
    pub report: WorkloadReport,
    /// Wall-clock time of the release, in nanoseconds since the Unix epoch.
    #[serde(rename = "td")]
    pub dispatched_at: i64,
    /// Dispatch jitter in nanoseconds.
    pub jitter: i64,
    /// Wall-clock time the response was complete, in nanoseconds since the Unix epoch.
    #[serde(rename = "Tf")]
    pub finished_at: i64,
    /// Experiment elapsed time at completion minus the ideal completion offset, in nanoseconds.
    pub drift: i64,
}
