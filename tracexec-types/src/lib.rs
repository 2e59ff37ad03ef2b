//! Wire-level types shared by the trace replay driver and the workload emulator.
//!
//! Every emulator call is a single HTTP `GET` whose query string carries the
//! [`WorkloadParams`]. The emulator validates them into a [`WorkloadRequest`], runs the idle and
//! busy phases, and answers with a [`WorkloadReport`] encoded as JSON.
//!
//! The [`timing`] module contains the two spin primitives both sides are built on: waiting for a
//! clock to reach a target, and burning CPU for a target duration or iteration count.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod params;
pub mod report;
pub mod timing;

pub use crate::params::{Busy, ParamError, WorkloadParams, WorkloadRequest, WorkloadSpec};
pub use crate::report::WorkloadReport;

/// Version of the wire protocol, reported in the `Version` response header.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Response header echoing the record id of the call.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Response header naming the function that served the call.
pub const HEADER_REQUEST_FUNCTION: &str = "x-request-function";

/// Response header carrying [`PROTOCOL_VERSION`].
pub const HEADER_VERSION: &str = "version";
