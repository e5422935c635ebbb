//! Background dispatch thread.
//!
//! [`DispatchRuntime`] owns a named thread running [`Scheduler::run`].
//! Producers keep using their own [`Scheduler`] clones; the runtime only
//! controls the loop's lifetime.
//!
//! # Shutdown
//!
//! [`shutdown()`](DispatchRuntime::shutdown) triggers the stop signal,
//! which wakes the loop if it is idle. A loop in the middle of a batch
//! finishes that batch first. The thread is then joined. Dropping the
//! runtime performs the same sequence.

use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{info, warn};

use crate::config::ConfigError;
use crate::dispatch::StopSignal;
use crate::scheduler::Scheduler;

/// Name given to the dispatch thread.
pub const DISPATCH_THREAD_NAME: &str = "tempo-dispatch";

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`DispatchRuntime::shutdown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Whether the dispatch thread was joined successfully.
    pub dispatch_joined: bool,
    /// Events still `Scheduled` when the loop exited. They never fire.
    pub pending_events: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimeState {
    Running,
    Stopped,
}

// ── DispatchRuntime ──────────────────────────────────────────────

/// A scheduler whose dispatch loop runs on its own thread.
pub struct DispatchRuntime {
    scheduler: Scheduler,
    stop: StopSignal,
    dispatch_thread: Option<JoinHandle<()>>,
    state: RuntimeState,
}

impl DispatchRuntime {
    /// Spawn the dispatch thread for `scheduler`.
    pub fn start(scheduler: Scheduler) -> Result<Self, ConfigError> {
        let stop = scheduler.stop_signal();
        let runner = scheduler.clone();
        let loop_stop = stop.clone();
        let dispatch_thread = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.into())
            .spawn(move || runner.run(&loop_stop))
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("{DISPATCH_THREAD_NAME}: {e}"),
            })?;
        Ok(Self {
            scheduler,
            stop,
            dispatch_thread: Some(dispatch_thread),
            state: RuntimeState::Running,
        })
    }

    /// The scheduler driven by this runtime.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Whether the dispatch thread is still alive.
    pub fn is_running(&self) -> bool {
        self.dispatch_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop and join its thread. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == RuntimeState::Stopped {
            return ShutdownReport {
                total_ms: 0,
                dispatch_joined: true,
                pending_events: self.scheduler.queue_size(),
            };
        }

        let start = Instant::now();
        self.stop.trigger();
        self.state = RuntimeState::Stopped;

        let dispatch_joined = match self.dispatch_thread.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        };
        if !dispatch_joined {
            warn!("dispatch thread panicked");
        }

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            dispatch_joined,
            pending_events: self.scheduler.queue_size(),
        };
        info!(
            total_ms = report.total_ms,
            pending = report.pending_events,
            "dispatch runtime shut down"
        );
        report
    }
}

impl Drop for DispatchRuntime {
    fn drop(&mut self) {
        if self.state != RuntimeState::Stopped {
            self.shutdown();
        }
    }
}
