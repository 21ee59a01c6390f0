//! Dispatch worker pool
//!
//! Pulls due micro-batches from the scheduler and executes them against
//! model backends. Concurrency is bounded per model by a semaphore sized
//! from the model's `instance_count`; backend calls run under
//! `spawn_blocking`; recoverable backend errors are retried with
//! exponential backoff before the batch is failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::dispatch::backend::{
    BackendError, BackendRegistry, BackendResult, BatchPayload, ModelBackend, RequestOutputs,
    RequestPayload,
};
use crate::metrics::Metrics;
use crate::registry::{ModelKey, ModelRegistry, Tensor};
use crate::scheduler::{BatchScheduler, MicroBatch, SchedulerError};

/// Retry configuration for temporary backend errors
///
/// Only recoverable errors (backend unavailable) are retried; execution
/// failures surface immediately.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts for recoverable errors
    pub max_retries: usize,

    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Multiplier for exponential backoff (e.g., 2.0 = double each time)
    pub backoff_multiplier: f64,

    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,

    /// Whether to add jitter to retry delays (prevents thundering herd)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 10,
            backoff_multiplier: 2.0,
            max_delay_ms: 1000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A retry config with no retries (for testing)
    pub fn no_retry() -> Self {
        RetryConfig {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate delay for the given retry attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);

        let delay_ms = base_delay.min(self.max_delay_ms as f64) as u64;

        if self.jitter {
            // Up to 25% jitter derived from the clock's subsecond nanos
            let jitter_range = delay_ms / 4;
            let jitter_amt = if jitter_range > 0 {
                use std::time::SystemTime;
                let nanos = SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                nanos % jitter_range
            } else {
                0
            };
            Duration::from_millis(delay_ms + jitter_amt)
        } else {
            Duration::from_millis(delay_ms)
        }
    }
}

/// Configuration for the dispatch worker pool
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Sleep between scheduler polls when no batch is due
    pub poll_interval: Duration,
    /// Concurrency bound for models whose registry entry is gone
    pub default_instance_count: usize,
    /// Retry policy for temporary backend errors
    pub retry: RetryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            poll_interval: Duration::from_millis(10),
            default_instance_count: 1,
            retry: RetryConfig::default(),
        }
    }
}

/// Executes micro-batches against model backends
///
/// Cheap to clone; all state is shared behind `Arc`s with the gateway that
/// owns it.
#[derive(Debug, Clone)]
pub struct DispatchPool {
    config: DispatchConfig,
    scheduler: Arc<RwLock<BatchScheduler>>,
    registry: Arc<RwLock<ModelRegistry>>,
    backends: Arc<BackendRegistry>,
    permits: Arc<RwLock<HashMap<ModelKey, Arc<Semaphore>>>>,
    notifiers: Arc<RwLock<HashMap<u32, Arc<Notify>>>>,
    metrics: Option<Arc<Metrics>>,
    is_running: Arc<RwLock<bool>>,
}

impl DispatchPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatchConfig,
        scheduler: Arc<RwLock<BatchScheduler>>,
        registry: Arc<RwLock<ModelRegistry>>,
        backends: Arc<BackendRegistry>,
        notifiers: Arc<RwLock<HashMap<u32, Arc<Notify>>>>,
        metrics: Option<Arc<Metrics>>,
        is_running: Arc<RwLock<bool>>,
    ) -> Self {
        DispatchPool {
            config,
            scheduler,
            registry,
            backends,
            permits: Arc::new(RwLock::new(HashMap::new())),
            notifiers,
            metrics,
            is_running,
        }
    }

    /// Run the dispatch loop until the running flag clears
    ///
    /// Spawned by the gateway on `start()`. Batches execute on their own
    /// tasks; the loop itself only forms batches and hands them off.
    pub async fn run(self) {
        info!("dispatch loop started");
        while *self.is_running.read().await {
            let batch = {
                let mut scheduler = self.scheduler.write().await;
                scheduler.next_batch()
            };

            match batch {
                Some(batch) => self.spawn_batch(batch).await,
                None => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
        info!("dispatch loop stopped");
    }

    /// Per-model semaphore, created on first use with the model's
    /// instance count
    async fn semaphore_for(&self, key: &ModelKey, instance_count: usize) -> Arc<Semaphore> {
        {
            let permits = self.permits.read().await;
            if let Some(sem) = permits.get(key) {
                return sem.clone();
            }
        }
        let mut permits = self.permits.write().await;
        permits
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(instance_count.max(1))))
            .clone()
    }

    async fn spawn_batch(&self, batch: MicroBatch) {
        let key = batch.key.clone();
        let (backend_name, instance_count) = {
            let registry = self.registry.read().await;
            match registry.config_for(&key) {
                Ok(config) => (config.backend.clone(), config.instance_count),
                Err(_) => (None, self.config.default_instance_count),
            }
        };

        let semaphore = self.semaphore_for(&key, instance_count).await;
        let pool = self.clone();
        tokio::spawn(async move {
            // Permit held for the whole execution; dropped on every exit path
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!(model = %key, "dispatch semaphore closed");
                    return;
                }
            };
            pool.execute_batch(batch, backend_name.as_deref()).await;
        });
    }

    async fn execute_batch(&self, batch: MicroBatch, backend_name: Option<&str>) {
        let key = batch.key.clone();
        let started = Instant::now();

        if let Some(metrics) = &self.metrics {
            metrics.record_batch_dispatched(batch.size());
            metrics.record_queue_wait(batch.max_queue_wait().as_secs_f64());
        }

        let payload = Arc::new(BatchPayload {
            key: key.clone(),
            requests: batch
                .requests
                .iter()
                .map(|r| RequestPayload {
                    request_id: r.request_id,
                    inputs: r.inputs.clone(),
                })
                .collect(),
        });

        let backend = match self.backends.get(backend_name) {
            Ok(backend) => backend,
            Err(e) => {
                warn!(model = %key, error = %e, "no backend for batch");
                self.fail_batch(&batch, &e.to_string()).await;
                return;
            }
        };

        debug!(
            batch_id = batch.batch_id,
            model = %key,
            size = batch.size(),
            backend = backend.name(),
            "executing micro-batch"
        );

        match self.execute_with_retry(backend, payload.clone()).await {
            Ok(results) => {
                if results.len() != payload.size() {
                    let err = BackendError::OutputMismatch {
                        expected: payload.size(),
                        actual: results.len(),
                    };
                    error!(model = %key, error = %err, "backend contract violation");
                    self.fail_batch(&batch, &err.to_string()).await;
                } else {
                    self.complete_batch(&batch, results).await;
                }
            }
            Err(e) => {
                error!(model = %key, error = %e, "batch execution failed");
                self.fail_batch(&batch, &e.to_string()).await;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_execution_duration(started.elapsed().as_secs_f64());
        }
    }

    async fn execute_with_retry(
        &self,
        backend: Arc<dyn ModelBackend>,
        payload: Arc<BatchPayload>,
    ) -> BackendResult<Vec<RequestOutputs>> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let backend_clone = backend.clone();
            let payload_clone = payload.clone();
            // Backends may block; keep them off the async runtime
            let result =
                match tokio::task::spawn_blocking(move || backend_clone.execute(&payload_clone))
                    .await
                {
                    Ok(result) => result,
                    Err(join_err) => Err(BackendError::Execution(format!(
                        "backend task panicked: {join_err}"
                    ))),
                };

            match result {
                Ok(outputs) => return Ok(outputs),
                Err(e) if e.is_recoverable() && attempt < retry.max_retries => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        model = %payload.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "backend unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_batch(&self, batch: &MicroBatch, results: Vec<RequestOutputs>) {
        let mut by_id: HashMap<u32, Vec<Tensor>> = results
            .into_iter()
            .map(|r| (r.request_id, r.outputs))
            .collect();

        for request in &batch.requests {
            match by_id.remove(&request.request_id) {
                Some(outputs) => {
                    self.finish_request(&batch.key, request.request_id, outputs)
                        .await
                }
                None => {
                    self.fail_one(
                        request.request_id,
                        "backend returned no outputs for request",
                    )
                    .await
                }
            }
        }
    }

    /// Validate outputs against the registry, then complete the request
    async fn finish_request(&self, key: &ModelKey, request_id: u32, outputs: Vec<Tensor>) {
        let validation = {
            let registry = self.registry.read().await;
            registry.validate_outputs(key, &outputs)
        };

        match validation {
            Ok(()) => {
                let completed = {
                    let mut scheduler = self.scheduler.write().await;
                    scheduler.complete_request(request_id, outputs)
                };
                match completed {
                    Ok(request) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_request_complete();
                            if let Some(d) = request.execution_time() {
                                metrics.record_request_duration(d.as_secs_f64());
                            }
                        }
                    }
                    Err(SchedulerError::RequestNotFound(_)) => {
                        // Cancelled while executing; result is dropped
                        debug!(request_id, "dropping result for vanished request");
                    }
                    Err(e) => {
                        error!(request_id, error = %e, "failed to complete request");
                    }
                }
            }
            Err(e) => {
                self.fail_one(request_id, &format!("output validation failed: {e}"))
                    .await;
            }
        }
        self.notify(request_id).await;
    }

    async fn fail_batch(&self, batch: &MicroBatch, error: &str) {
        for request in &batch.requests {
            self.fail_one(request.request_id, error).await;
            self.notify(request.request_id).await;
        }
    }

    async fn fail_one(&self, request_id: u32, error: &str) {
        let failed = {
            let mut scheduler = self.scheduler.write().await;
            scheduler.fail_request(request_id, error)
        };
        match failed {
            Ok(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_request_failed();
                }
            }
            Err(SchedulerError::RequestNotFound(_)) => {
                debug!(request_id, "dropping failure for vanished request");
            }
            Err(e) => {
                error!(request_id, error = %e, "failed to mark request failed");
            }
        }
    }

    async fn notify(&self, request_id: u32) {
        let notifier = {
            let notifiers = self.notifiers.read().await;
            notifiers.get(&request_id).cloned()
        };
        if let Some(notify) = notifier {
            notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 10);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_delay_ms, 1000);
        assert!(config.jitter);
    }

    #[test]
    fn test_retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_retry_delay_exponential_and_capped() {
        let config = RetryConfig::new()
            .with_initial_delay_ms(10)
            .with_backoff_multiplier(2.0)
            .with_max_delay_ms(100)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(0).as_millis(), 10);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 20);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 40);
        // 10 * 2^10 = 10240, capped at 100
        assert_eq!(config.delay_for_attempt(10).as_millis(), 100);
    }

    #[test]
    fn test_retry_jitter_in_range() {
        let config = RetryConfig::new()
            .with_initial_delay_ms(100)
            .with_backoff_multiplier(1.0)
            .with_max_delay_ms(200)
            .with_jitter(true);

        let delay = config.delay_for_attempt(0);
        assert!(delay.as_millis() >= 100);
        assert!(delay.as_millis() <= 125);
    }

    #[test]
    fn test_dispatch_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.default_instance_count, 1);
        assert_eq!(config.retry.max_retries, 3);
    }
}
