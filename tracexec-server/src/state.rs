use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Config;

/// Shared reference to the emulator [service state](State).
pub type ServiceState = Arc<State>;

/// State shared with all HTTP request handlers.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference to
/// this structure.
#[derive(Debug)]
pub struct State {
    /// The server configuration.
    pub config: Config,
    /// Number of workloads currently executing.
    running: AtomicUsize,
}

impl State {
    /// Creates the shared state for the given configuration.
    pub fn new(config: Config) -> ServiceState {
        Arc::new(Self {
            config,
            running: AtomicUsize::new(0),
        })
    }

    /// Returns the number of workloads currently executing.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    /// Returns `true` if every workload thread is occupied.
    pub fn is_saturated(&self) -> bool {
        self.running() >= self.config.runtime.max_blocking_threads
    }

    /// Marks a workload as running until the returned guard is dropped.
    pub fn track_workload(self: &Arc<Self>) -> RunningGuard {
        self.running.fetch_add(1, Ordering::Relaxed);
        RunningGuard(Arc::clone(self))
    }
}

/// Decrements the running workload count on drop.
#[derive(Debug)]
pub struct RunningGuard(ServiceState);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Runtime;

    #[test]
    fn test_running_guard() {
        let state = State::new(Config {
            runtime: Runtime {
                worker_threads: 1,
                max_blocking_threads: 2,
            },
            ..Default::default()
        });

        let first = state.track_workload();
        assert_eq!(state.running(), 1);
        assert!(!state.is_saturated());

        let second = state.track_workload();
        assert!(state.is_saturated());

        drop(first);
        drop(second);
        assert_eq!(state.running(), 0);
    }
}
