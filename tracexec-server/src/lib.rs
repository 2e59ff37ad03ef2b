//! The workload emulator component.
//!
//! Serves a single endpoint that emulates a compute task of a given duration: it sleeps for the
//! requested idle time, then spins on the CPU for the requested busy time or iteration count, and
//! reports its own fine-grained measurements of both phases. Replay drivers call it once per trace
//! record and subtract these measurements from their own timestamps.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod emulator;
pub mod endpoints;
pub mod error;
pub mod healthcheck;
pub mod observability;
pub mod state;
pub mod web;
