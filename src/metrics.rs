//! Prometheus-compatible metrics collection for ModelGate
//!
//! Provides thread-safe metrics for monitoring the gateway. Metrics are
//! exported in Prometheus text format via the /metrics endpoint.
//!
//! Uses prometheus-client crate for thread-safe metric collection.

use prometheus_client::{
    encoding::text::encode,
    metrics::counter::Counter,
    metrics::gauge::Gauge,
    metrics::histogram::{exponential_buckets, linear_buckets, Histogram},
    registry::Registry,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Primary metrics collection structure
///
/// All metric updates use lock-free atomic operations.
#[derive(Debug)]
pub struct Metrics {
    /// Registry containing all metrics
    pub registry: Registry,

    /// Total requests admitted by the router
    pub requests_started: Counter<u64>,

    /// Total requests completed
    pub requests_completed: Counter<u64>,

    /// Total requests failed
    pub requests_failed: Counter<u64>,

    /// Total requests cancelled
    pub requests_cancelled: Counter<u64>,

    /// Total micro-batches dispatched
    pub batches_dispatched: Counter<u64>,

    /// Requests per dispatched micro-batch
    pub batch_size: Histogram,

    /// Time requests spend queued before batching
    pub queue_wait_seconds: Histogram,

    /// Wall time of backend batch execution
    pub execution_duration_seconds: Histogram,

    /// End-to-end request duration
    pub request_duration_seconds: Histogram,

    /// Current pending queue depth
    pub queue_length: Gauge<i64>,

    /// Current number of in-flight requests
    pub active_requests: Gauge<i64>,

    /// Model versions currently ready to serve
    pub models_ready: Gauge<i64>,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_started = Counter::default();
        registry.register(
            "modelgate_requests_started_total",
            "Total number of inference requests admitted",
            requests_started.clone(),
        );

        let requests_completed = Counter::default();
        registry.register(
            "modelgate_requests_completed_total",
            "Total number of inference requests completed",
            requests_completed.clone(),
        );

        let requests_failed = Counter::default();
        registry.register(
            "modelgate_requests_failed_total",
            "Total number of inference requests failed",
            requests_failed.clone(),
        );

        let requests_cancelled = Counter::default();
        registry.register(
            "modelgate_requests_cancelled_total",
            "Total number of inference requests cancelled",
            requests_cancelled.clone(),
        );

        let batches_dispatched = Counter::default();
        registry.register(
            "modelgate_batches_dispatched_total",
            "Total number of micro-batches dispatched to backends",
            batches_dispatched.clone(),
        );

        // Batch sizes are small integers; linear buckets 1..=32
        let batch_size = Histogram::new(linear_buckets(1.0, 2.0, 16));
        registry.register(
            "modelgate_batch_size",
            "Requests per dispatched micro-batch",
            batch_size.clone(),
        );

        // Duration buckets: 1ms .. 100s
        let queue_wait_seconds = Histogram::new(exponential_buckets(0.001, 10.0, 6));
        registry.register(
            "modelgate_queue_wait_seconds",
            "Time requests spend queued before batching",
            queue_wait_seconds.clone(),
        );

        let execution_duration_seconds = Histogram::new(exponential_buckets(0.001, 10.0, 6));
        registry.register(
            "modelgate_execution_duration_seconds",
            "Backend batch execution duration in seconds",
            execution_duration_seconds.clone(),
        );

        let request_duration_seconds = Histogram::new(exponential_buckets(0.001, 10.0, 6));
        registry.register(
            "modelgate_request_duration_seconds",
            "End-to-end request duration in seconds",
            request_duration_seconds.clone(),
        );

        let queue_length = Gauge::default();
        registry.register(
            "modelgate_queue_length",
            "Current number of requests in pending queues",
            queue_length.clone(),
        );

        let active_requests = Gauge::default();
        registry.register(
            "modelgate_active_requests",
            "Current number of in-flight requests",
            active_requests.clone(),
        );

        let models_ready = Gauge::default();
        registry.register(
            "modelgate_models_ready",
            "Model versions currently ready to serve",
            models_ready.clone(),
        );

        Metrics {
            registry,
            requests_started,
            requests_completed,
            requests_failed,
            requests_cancelled,
            batches_dispatched,
            batch_size,
            queue_wait_seconds,
            execution_duration_seconds,
            request_duration_seconds,
            queue_length,
            active_requests,
            models_ready,
        }
    }

    /// Record a request admitted by the router
    pub fn record_request_start(&self) {
        self.requests_started.inc();
        self.active_requests.inc();
    }

    /// Record a request completing successfully
    pub fn record_request_complete(&self) {
        self.requests_completed.inc();
        self.active_requests.dec();
    }

    /// Record a request failure
    pub fn record_request_failed(&self) {
        self.requests_failed.inc();
        self.active_requests.dec();
    }

    /// Record a request cancellation
    pub fn record_request_cancelled(&self) {
        self.requests_cancelled.inc();
        self.active_requests.dec();
    }

    /// Record a micro-batch handed to a backend
    pub fn record_batch_dispatched(&self, size: usize) {
        self.batches_dispatched.inc();
        self.batch_size.observe(size as f64);
    }

    /// Record queue wait of the longest-waiting request in a batch
    pub fn record_queue_wait(&self, duration_sec: f64) {
        self.queue_wait_seconds.observe(duration_sec);
    }

    /// Record backend batch execution duration
    pub fn record_execution_duration(&self, duration_sec: f64) {
        self.execution_duration_seconds.observe(duration_sec);
    }

    /// Record end-to-end request duration
    pub fn record_request_duration(&self, duration_sec: f64) {
        self.request_duration_seconds.observe(duration_sec);
    }

    /// Update pending queue depth
    pub fn set_queue_length(&self, length: u64) {
        self.queue_length.set(length as i64);
    }

    /// Update the ready-model-version gauge
    pub fn set_models_ready(&self, count: u64) {
        self.models_ready.set(count as i64);
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry).expect("encoding should succeed");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics accessor
///
/// Thread-safe handle the HTTP layer uses to reach the metrics instance.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    inner: Arc<RwLock<Option<Arc<Metrics>>>>,
}

impl MetricRegistry {
    /// Create a new empty metric registry
    pub fn new() -> Self {
        MetricRegistry {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Initialize the metrics instance
    pub async fn init(&self, metrics: Arc<Metrics>) {
        let mut guard = self.inner.write().await;
        *guard = Some(metrics);
    }

    /// Get a reference to the metrics, if initialized
    pub async fn get(&self) -> Option<Arc<Metrics>> {
        let guard = self.inner.read().await;
        guard.as_ref().map(Arc::clone)
    }

    /// Export metrics in Prometheus text format
    pub async fn export(&self) -> String {
        if let Some(metrics) = self.get().await {
            metrics.export()
        } else {
            "# ModelGate Metrics\n# Metrics not initialized\n".to_string()
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
