//! Micro-batch formation types and scheduler configuration

use std::time::{Duration, Instant};

use crate::registry::ModelKey;
use crate::scheduler::types::InferenceRequest;

/// A group of requests for one model version, processed together
///
/// Micro-batches are homogeneous: every request shares the batch's
/// `ModelKey`. They are formed from a model's pending queue once the queue
/// is due (full enough, or its head has waited long enough).
#[derive(Debug)]
pub struct MicroBatch {
    pub batch_id: u32,
    pub key: ModelKey,
    pub requests: Vec<InferenceRequest>,
    pub created_at: Instant,
}

impl MicroBatch {
    pub fn new(batch_id: u32, key: ModelKey) -> Self {
        MicroBatch {
            batch_id,
            key,
            requests: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Total input elements across the batch
    pub fn total_elements(&self) -> usize {
        self.requests.iter().map(|r| r.input_elements()).sum()
    }

    /// Longest queue wait among the batch's requests
    pub fn max_queue_wait(&self) -> Duration {
        self.requests
            .iter()
            .filter_map(|r| r.queue_wait())
            .max()
            .unwrap_or_default()
    }
}

/// Per-model batching policy
///
/// Installed by the gateway from the model's configuration when a version is
/// registered; models without a policy fall back to the scheduler defaults.
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    /// Maximum requests per micro-batch
    pub max_batch_size: usize,
    /// Batch sizes to favor once the queue is due; empty means any size
    pub preferred_batch_sizes: Vec<usize>,
    /// Longest a head request may wait before its queue becomes due
    pub max_queue_delay: Duration,
}

impl QueuePolicy {
    /// Number of requests to take from a due queue holding `pending` requests
    pub fn batch_take(&self, pending: usize) -> usize {
        let cap = pending.min(self.max_batch_size);
        if self.preferred_batch_sizes.is_empty() {
            return cap;
        }
        // Largest preferred size that fits; a due queue smaller than every
        // preferred size is drained as-is rather than waiting forever.
        self.preferred_batch_sizes
            .iter()
            .copied()
            .filter(|&p| p <= cap)
            .max()
            .unwrap_or(cap)
    }
}

/// Configuration for the batching scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Per-model pending queue capacity
    pub max_queue_size: usize,
    /// Batch size bound for models without an installed policy
    pub default_max_batch_size: usize,
    /// Batching timeout for models without an installed policy
    pub batch_timeout: Duration,
    /// Finished requests retained for status queries before pruning
    pub max_completed_retained: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_queue_size: 1000,
            default_max_batch_size: 32,
            batch_timeout: Duration::from_millis(50),
            max_completed_retained: 1024,
        }
    }
}

impl SchedulerConfig {
    /// Fallback policy for models that never installed one
    pub fn default_policy(&self) -> QueuePolicy {
        QueuePolicy {
            max_batch_size: self.default_max_batch_size,
            preferred_batch_sizes: Vec::new(),
            max_queue_delay: self.batch_timeout,
        }
    }
}
