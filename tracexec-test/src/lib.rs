//! Test utilities for the `tracexec` crates.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod server;
