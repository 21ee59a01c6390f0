//! Queue statistics for the batching scheduler

use std::collections::HashMap;

/// Snapshot of request counts per state at a point in time
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending_requests: usize,
    pub processing_requests: usize,
    pub completed_requests: usize,
    /// Pending depth per model name
    pub pending_per_model: HashMap<String, usize>,
}

impl QueueStats {
    /// Total requests tracked (pending + processing + completed)
    pub fn total_requests(&self) -> usize {
        self.pending_requests + self.processing_requests + self.completed_requests
    }

    /// Requests not yet finished (pending + processing)
    pub fn active_requests(&self) -> usize {
        self.pending_requests + self.processing_requests
    }

    /// Check if all queues are empty
    pub fn is_empty(&self) -> bool {
        self.total_requests() == 0
    }
}
