//! Configuration for the gateway
//!
//! [`GatewayConfig`] aggregates the scheduler and dispatch settings plus the
//! model repository location, with builder-style setters.

use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::{DispatchConfig, RetryConfig};
use crate::scheduler::SchedulerConfig;

/// Configuration for the gateway
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Batching scheduler settings
    pub scheduler: SchedulerConfig,

    /// Dispatch worker pool settings
    pub dispatch: DispatchConfig,

    /// Model repository directory; falls back to env / default when unset
    pub model_repository: Option<PathBuf>,
}

impl GatewayConfig {
    /// Create a new gateway config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-model pending queue capacity
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.scheduler.max_queue_size = max_queue_size;
        self
    }

    /// Set the default batch size bound
    pub fn with_default_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.scheduler.default_max_batch_size = max_batch_size;
        self
    }

    /// Set the default batching timeout
    pub fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.scheduler.batch_timeout = batch_timeout;
        self
    }

    /// Set how many finished requests are retained for status queries
    pub fn with_max_completed_retained(mut self, retained: usize) -> Self {
        self.scheduler.max_completed_retained = retained;
        self
    }

    /// Set the dispatch loop poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.dispatch.poll_interval = poll_interval;
        self
    }

    /// Set the backend retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.dispatch.retry = retry;
        self
    }

    /// Set the model repository directory
    pub fn with_model_repository(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_repository = Some(path.into());
        self
    }
}
