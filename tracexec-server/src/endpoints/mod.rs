//! Contains all HTTP endpoint handlers.
//!
//! The emulator is served at the root path, so it can sit behind name-based routing where every
//! function is its own virtual host. Health endpoints live next to it.

use axum::Router;
use axum::routing::get;

use crate::state::ServiceState;

mod health;
mod workload;

/// Returns the router with all endpoints of the emulator.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/", get(workload::invoke))
        .merge(health::router())
}
