//! Replaying a trace against the emulator.

use std::future::{self, Future};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracexec_types::report::{saturating_nanos, unix_nanos};

use crate::config::Config;
use crate::dispatch::{self, DispatchError, Dispatcher, InvocationResult, PreparedRequest};
use crate::epoch::Epoch;
use crate::observer::{DispatchObserver, JournalObserver, NoopObserver};
use crate::plan::{self, DutyCycle};
use crate::recorder::{ErrorEvent, Recorder};
use crate::scheduler::Scheduler;
use crate::summary::{RunMetrics, RunSummary};
use crate::trace;

/// Replays the configured trace and waits until every call has completed.
///
/// Pressing Ctrl-C journals a fatal error and ends the run. See [`run_until`].
pub async fn run(config: Config) -> Result<RunSummary> {
    run_until(config, interrupted()).await
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            error = &error as &dyn std::error::Error,
            "failed to listen for Ctrl-C"
        );
        future::pending::<()>().await;
    }
}

/// Replays the configured trace until every call has completed or `interrupt` resolves.
///
/// An interrupt is journaled as a fatal error. Configuration errors are returned before any traffic starts: an invalid duty cycle, an epoch in
/// the past, an unreadable trace, or a record that cannot be turned into a request. Failed calls
/// are journaled and do not stop the run. A fatal journal entry stops the run immediately with an
/// error.
pub async fn run_until(
    config: Config,
    interrupt: impl Future<Output = ()>,
) -> Result<RunSummary> {
    let duty = DutyCycle::new(config.duty_cycle, config.duty_policy)
        .context("invalid duty cycle")?;
    let epoch = Epoch::new(config.begin_at).context("invalid begin time")?;

    let records = trace::load(&config.trace, config.record_range())?;
    let initial_offset = config.initial_offset.resolve(&records);
    let epoch = Arc::new(epoch.with_initial_offset(initial_offset));

    let fatal = CancellationToken::new();
    let recorder = Arc::new(Recorder::open(&config, epoch.clone(), fatal.clone()));
    log_banner(&config, duty, &epoch, &recorder);

    let client = dispatch::client(&config.http).context("failed to create HTTP client")?;
    let observer: Arc<dyn DispatchObserver> = if config.debug_events {
        Arc::new(JournalObserver::new(recorder.clone()))
    } else {
        Arc::new(NoopObserver)
    };

    let mut requests = Vec::with_capacity(records.len());
    for entry in plan::schedule(records, duty) {
        let record_id = entry.record.id.clone();
        match PreparedRequest::build(&client, &config, entry) {
            Ok(request) => requests.push(request),
            Err(error) => {
                recorder.error(&ErrorEvent::dispatch(&record_id, &error, true));
                return Err(error).context("failed to pre-generate requests");
            }
        }
    }
    tracing::info!(
        requests = requests.len(),
        begin_at = %epoch.begin_at(),
        "Requests pre generated"
    );

    let bar = ProgressBar::new(requests.len() as u64)
        .with_style(ProgressStyle::with_template("{spinner} {msg} {pos}/{len} {elapsed}")?)
        .with_message("Replaying trace:");
    bar.enable_steady_tick(Duration::from_millis(100));

    let replay = Arc::new(Replay {
        scheduler: Scheduler::new(epoch.clone(), &config.spin),
        dispatcher: Dispatcher::new(client, observer),
        recorder: recorder.clone(),
        metrics: RunMetrics::new(requests.len()),
    });

    let mut tasks = JoinSet::new();
    for request in requests {
        tasks.spawn(replay.clone().dispatch(request));
    }

    tokio::pin!(interrupt);
    let mut interrupted = false;
    loop {
        tokio::select! {
            biased;

            _ = fatal.cancelled() => {
                tasks.abort_all();
                bar.abandon();
                recorder.flush();
                bail!("run terminated by a fatal error");
            }
            joined = tasks.join_next() => match joined {
                Some(Ok(())) => bar.inc(1),
                Some(Err(error)) => {
                    let message = format!("dispatch task failed: {error}");
                    recorder.error(&ErrorEvent::new(message, true));
                }
                None => break,
            },
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                recorder.error(&ErrorEvent::new("run interrupted", true));
            }
        }
    }

    bar.finish_and_clear();
    recorder.flush();

    let since_begin = epoch.elapsed_ns() - saturating_nanos(epoch.initial_offset());
    let summary = replay
        .metrics
        .summary(Duration::from_nanos(since_begin.max(0) as u64));
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "replay finished"
    );

    Ok(summary)
}

fn log_banner(config: &Config, duty: DutyCycle, epoch: &Epoch, recorder: &Recorder) {
    let (out, err, dbg) = recorder.paths();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        url = %config.url,
        trace = %config.trace.display(),
        range = %format_args!("[{}:{}]", config.first_record, config.last_record),
        duty = duty.get(),
        begin_at = %epoch.begin_at(),
        initial_offset = ?epoch.initial_offset(),
        out = %out.display(),
        err = %err.display(),
        dbg = ?dbg,
        debug_function = config.debug_function(),
        "starting trace replay"
    );
}

/// Shared state of all dispatch tasks.
#[derive(Debug)]
struct Replay {
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    recorder: Arc<Recorder>,
    metrics: RunMetrics,
}

impl Replay {
    /// Waits for the arrival offset of `prepared`, sends it, and journals the outcome.
    async fn dispatch(self: Arc<Self>, prepared: PreparedRequest) {
        let PreparedRequest {
            entry,
            params,
            request,
        } = prepared;
        let record_id = entry.record.id.as_str();
        let offset = entry.record.arrival_offset;
        let observer = self.dispatcher.observer();

        observer.scheduled(record_id, offset);
        let release = match self.scheduler.release(offset).await {
            Ok(release) => release,
            Err(error) => {
                let event = ErrorEvent {
                    rid: Some(record_id.to_owned()),
                    ..ErrorEvent::new(format!("failed to wait for arrival: {error}"), true)
                };
                self.recorder.error(&event);
                return;
            }
        };
        observer.released(record_id, &release);
        self.metrics.record_release(release.jitter_ns);

        let sent = Instant::now();
        match self.dispatcher.send(record_id, request).await {
            Ok(report) => {
                let round_trip = sent.elapsed();
                let finished_at = unix_nanos(SystemTime::now());
                let ideal = saturating_nanos(offset) + entry.plan.total_ns();
                let drift = self.scheduler.epoch().elapsed_ns() - ideal;

                self.metrics.record_success(round_trip);
                self.recorder.success(&InvocationResult {
                    params,
                    report,
                    dispatched_at: unix_nanos(release.released_at),
                    jitter: release.jitter_ns,
                    finished_at,
                    drift,
                });
            }
            Err(error) => self.fail(record_id, error),
        }
    }

    fn fail(&self, record_id: &str, error: DispatchError) {
        tracing::warn!(error = %error.chain(), record_id, "dispatch failed");
        self.dispatcher.observer().failed(record_id, &error);
        self.metrics.record_failure();
        self.recorder.error(&ErrorEvent::dispatch(record_id, &error, false));
    }
}
