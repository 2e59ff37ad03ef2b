//! Blackbox tests for the emulator endpoint.

use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use reqwest::header::HOST;
use tracexec_server::error::ApiErrorResponse;
use tracexec_server::healthcheck;
use tracexec_test::server::TestServer;
use tracexec_types::WorkloadReport;

#[tokio::test]
async fn test_probe_is_empty_ok() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/?ts=abc")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_repeated_key_without_client() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/?id=a&id=b")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_repeated_key_uses_first_value() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/?cl=test&id=R1&id=R2&ts=0&ts=soon&it=10"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "R1");

    let report: WorkloadReport = response.json().await?;
    assert_eq!(report.iterations, 10);

    Ok(())
}

#[tokio::test]
async fn test_missing_busy_bound_is_rejected() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/?cl=test&ts=1000")).send().await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ApiErrorResponse = response.json().await?;
    assert_eq!(
        body.detail.as_deref(),
        Some("bad request: missing 'tb' parameter")
    );

    Ok(())
}

#[tokio::test]
async fn test_malformed_sleep_is_rejected() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/?cl=test&ts=soon&tb=1000"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_duration_mode() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let sleep = Duration::from_millis(30);
    let busy = Duration::from_millis(20);
    let response = client
        .get(server.url("/"))
        .header(HOST, "simtask-F1.default.knative.dev")
        .query(&[
            ("cl", "test"),
            ("id", "R1"),
            ("fid", "F1"),
            ("t0", "0"),
            ("ts", &sleep.as_nanos().to_string()),
            ("tb", &busy.as_nanos().to_string()),
        ])
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-request-id"], "R1");
    assert_eq!(headers["x-request-function"], "simtask-F1");
    assert_eq!(headers["version"], tracexec_types::PROTOCOL_VERSION);
    assert_eq!(headers["content-type"], "application/json");

    let report: WorkloadReport = response.json().await?;
    assert!(u128::from(report.idle_ns) >= sleep.as_nanos());
    assert!(u128::from(report.busy_ns) >= busy.as_nanos());
    assert!(report.elapsed_ns >= report.idle_ns + report.busy_ns);

    Ok(())
}

#[tokio::test]
async fn test_iteration_mode() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/?cl=test&id=R2&ts=0&it=10000"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let report: WorkloadReport = response.json().await?;
    assert_eq!(report.iterations, 10_000);
    assert!(report.idle_ns < 5_000_000);

    Ok(())
}

#[tokio::test]
async fn test_health_and_ready() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/health")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");

    let response = client.get(server.url("/ready")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_healthcheck() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let base_url = server.url("/");

    healthcheck::check(&client, &base_url, false).await?;
    healthcheck::check(&client, &base_url, true).await?;

    // The emulator only serves the root path, so a prefix breaks both checks.
    let missing = server.url("/nested");
    assert!(healthcheck::check(&client, &missing, false).await.is_err());

    Ok(())
}
