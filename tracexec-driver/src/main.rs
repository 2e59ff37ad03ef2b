//! The `tracexec` binary, replaying a trace against the workload emulator.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use tracexec_driver::Config;

/// Replays a serverless invocation trace against the workload emulator.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    tracexec_log::init(&config.logging);
    tracing::debug!(?config);

    let summary = tracexec_driver::run(config).await?;
    summary.print();

    Ok(())
}
