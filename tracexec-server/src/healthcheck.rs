use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};

use crate::config::Config;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Checks a running emulator on the configured address.
///
/// With `ready`, the readiness endpoint is checked instead of liveness, so that the check fails
/// while every workload thread is busy.
pub async fn healthcheck(config: Config, ready: bool) -> Result<()> {
    let client = Client::builder().timeout(TIMEOUT).build()?;
    check(&client, &format!("http://{}", config.http_addr), ready).await?;

    tracing::info!("OK");
    Ok(())
}

/// Checks the health endpoint of the emulator at `base_url`, then sends it a probe call.
///
/// A probe is a call without a client id. The emulator must answer it with an empty `200` and
/// without running a workload.
pub async fn check(client: &Client, base_url: &str, ready: bool) -> Result<()> {
    let endpoint = if ready { "ready" } else { "health" };
    let url = format!("{}/{endpoint}", base_url.trim_end_matches('/'));

    tracing::debug!("sending healthcheck request to {}", url);
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        bail!("Bad Status: {}", response.status());
    }

    let url = format!("{}/", base_url.trim_end_matches('/'));
    tracing::debug!("sending probe call to {}", url);
    let response = client.get(&url).send().await?;
    if response.status() != StatusCode::OK {
        bail!("Bad probe status: {}", response.status());
    }
    let body = response.bytes().await.context("failed to read probe response")?;
    if !body.is_empty() {
        bail!("probe response has a body of {} bytes", body.len());
    }

    Ok(())
}
