use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Router, routing};

use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/health", routing::get(health))
        .route("/ready", routing::get(ready))
}

async fn health() -> impl IntoResponse {
    "OK"
}

async fn ready(State(state): State<ServiceState>) -> impl IntoResponse {
    if state.is_saturated() {
        tracing::warn!(
            running = state.running(),
            "All workload threads are busy, failing readiness"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Workload threads saturated");
    }

    (StatusCode::OK, "OK")
}
