//! Replay driver for serverless invocation traces.
//!
//! Reads a trace of recorded invocations, splits each recorded duration into an idle and a busy
//! phase according to a duty cycle, and calls the workload emulator once per record at the
//! record's arrival offset relative to a shared epoch. Releases are timed with a spin-wait rather
//! than OS timers. Every outcome is journaled together with the emulator's own measurements.
//!
//! The pipeline, in order:
//!
//!  1. [`trace`] loads the records,
//!  2. [`plan`] splits their durations,
//!  3. [`dispatch`] pre-builds one request per record,
//!  4. [`scheduler`] releases each request against the [`epoch`],
//!  5. [`recorder`] journals the results.
//!
//! [`replay::run`] drives a complete run.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod dispatch;
pub mod epoch;
pub mod observer;
pub mod plan;
pub mod recorder;
pub mod replay;
pub mod scheduler;
pub mod summary;
pub mod trace;

pub use crate::config::Config;
pub use crate::replay::{run, run_until};
