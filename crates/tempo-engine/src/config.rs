//! Scheduler configuration, validation, and error types.
//!
//! [`SchedulerConfig`] is the input to
//! [`Scheduler::new`](crate::scheduler::Scheduler::new).
//! [`validate()`](SchedulerConfig::validate) checks its invariants before
//! any state is allocated.

use std::time::Duration;

use thiserror::Error;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while building a scheduler or starting its runtime.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_pending_events` is zero.
    #[error("max_pending_events must be at least 1")]
    QueueCapacityZero,
    /// `deferred_capacity` is zero.
    #[error("deferred_capacity must be at least 1")]
    DeferredCapacityZero,
    /// `max_idle_wait` is zero, which would turn the dispatch loop into a
    /// busy spin.
    #[error("max_idle_wait must be non-zero")]
    IdleWaitZero,
    /// `max_delay` is `Some(0)`, which would reject every delay.
    #[error("max_delay must be non-zero when set")]
    MaxDelayZero,
    /// The dispatch thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

// ── SchedulerConfig ────────────────────────────────────────────────

/// Complete configuration for a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum events in the `Scheduled` state. Default: 65536.
    pub max_pending_events: usize,
    /// Longest the dispatch loop sleeps with nothing due. Bounds how
    /// quickly a stop request or a clock jump is noticed. Default: 50ms.
    pub max_idle_wait: Duration,
    /// Capacity of the deferred-insert channel. Default: 1024.
    pub deferred_capacity: usize,
    /// Largest accepted delay; longer delays are refused. Default: `None`
    /// (unbounded).
    pub max_delay: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_pending_events: 65_536,
            max_idle_wait: Duration::from_millis(50),
            deferred_capacity: 1024,
            max_delay: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate all invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_events == 0 {
            return Err(ConfigError::QueueCapacityZero);
        }
        if self.deferred_capacity == 0 {
            return Err(ConfigError::DeferredCapacityZero);
        }
        if self.max_idle_wait.is_zero() {
            return Err(ConfigError::IdleWaitZero);
        }
        if self.max_delay.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::MaxDelayZero);
        }
        Ok(())
    }
}
