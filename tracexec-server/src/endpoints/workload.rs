use axum::extract::{Query, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use tracexec_types::{
    HEADER_REQUEST_FUNCTION, HEADER_REQUEST_ID, HEADER_VERSION, PROTOCOL_VERSION, WorkloadParams,
    WorkloadRequest,
};

use crate::emulator::{self, Receipt};
use crate::error::ApiResult;
use crate::state::ServiceState;

/// Runs one emulated workload, or answers a probe.
///
/// A call without the `cl` parameter is a probe and gets an empty `200`. Otherwise the parameters
/// are validated, the workload runs to completion, and the measured timings are returned as JSON.
pub async fn invoke(
    State(state): State<ServiceState>,
    Extension(receipt): Extension<Receipt>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = WorkloadParams::from_pairs(pairs);
    let spec = match params.validate()? {
        WorkloadRequest::Probe => return Ok(StatusCode::OK.into_response()),
        WorkloadRequest::Run(spec) => spec,
    };

    let record_id = spec.record_id.clone();
    let function = headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .map(function_name)
        .unwrap_or_default()
        .to_owned();

    tracing::trace!(?record_id, %function, ?spec, "running workload");
    let report = {
        let _running = state.track_workload();
        emulator::run(receipt, spec).await?
    };

    let mut response = Json(report).into_response();
    let response_headers = response.headers_mut();
    if let Some(value) = record_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response_headers.insert(HeaderName::from_static(HEADER_REQUEST_ID), value);
    }
    if let Ok(value) = HeaderValue::from_str(&function) {
        response_headers.insert(HeaderName::from_static(HEADER_REQUEST_FUNCTION), value);
    }
    response_headers.insert(
        HeaderName::from_static(HEADER_VERSION),
        HeaderValue::from_static(PROTOCOL_VERSION),
    );

    Ok(response)
}

/// Extracts the function name from a `Host` header, which is its first DNS label.
fn function_name(host: &str) -> &str {
    host.split(['.', ':']).next().unwrap_or_default()
}
