//! Module implementing the emulator webserver.
//!
//! The main server application is implemented in the [`App`] struct, which sets up routing,
//! middleware, and the HTTP server. To listen to incoming connections, use the [`server()`]
//! function, which opens a TCP listener and serves the application.
//!
//! # Testing
//!
//! For end-to-end tests of the server, see the `tracexec-test` crate, which starts an in-process
//! server on a random local port.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;
