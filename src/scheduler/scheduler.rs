//! Per-model micro-batching scheduler
//!
//! Requests accumulate in per-model-version queues. A queue becomes *due*
//! when it holds a full batch or its head request has waited past the
//! model's queue delay; `next_batch` then forms a micro-batch from the due
//! queue whose head has waited longest.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tracing::debug;

use crate::registry::{ModelKey, Tensor};
use crate::scheduler::batch::{MicroBatch, QueuePolicy, SchedulerConfig};
use crate::scheduler::queue::QueueStats;
use crate::scheduler::types::{
    InferenceRequest, RequestState, SchedulerError, SchedulerResult,
};

/// Accumulates inference requests per model into micro-batches
///
/// Requests live in exactly one of three places: a pending queue, the
/// processing map, or the bounded completed map.
#[derive(Debug)]
pub struct BatchScheduler {
    config: SchedulerConfig,
    policies: HashMap<ModelKey, QueuePolicy>,
    queues: HashMap<ModelKey, VecDeque<InferenceRequest>>,
    processing: HashMap<u32, InferenceRequest>,
    completed: HashMap<u32, InferenceRequest>,
    completed_order: VecDeque<u32>,
    next_request_id: u32,
    next_batch_id: u32,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        BatchScheduler {
            config,
            policies: HashMap::new(),
            queues: HashMap::new(),
            processing: HashMap::new(),
            completed: HashMap::new(),
            completed_order: VecDeque::new(),
            next_request_id: 0,
            next_batch_id: 0,
        }
    }

    /// Install the batching policy for a model version
    pub fn set_policy(&mut self, key: ModelKey, policy: QueuePolicy) {
        self.policies.insert(key, policy);
    }

    /// Drop a model version's policy (on unregister)
    pub fn remove_policy(&mut self, key: &ModelKey) {
        self.policies.remove(key);
    }

    fn policy_for(&self, key: &ModelKey) -> QueuePolicy {
        self.policies
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.config.default_policy())
    }

    /// Enqueue a request for a model version
    ///
    /// Rejects with `QueueCapacityExceeded` when the model's pending queue
    /// is full.
    pub fn submit(
        &mut self,
        key: ModelKey,
        inputs: Vec<Tensor>,
        correlation_id: Option<String>,
        priority: u32,
    ) -> SchedulerResult<u32> {
        let queue = self.queues.entry(key.clone()).or_default();
        if queue.len() >= self.config.max_queue_size {
            return Err(SchedulerError::QueueCapacityExceeded {
                model: key.name.clone(),
            });
        }

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let request =
            InferenceRequest::new(request_id, key.clone(), inputs, correlation_id, priority);
        queue.push_back(request);

        debug!(request_id, model = %key, "request enqueued");
        Ok(request_id)
    }

    /// Form the next micro-batch, if any queue is due
    ///
    /// Due queues are served oldest-head-first, so no model starves while a
    /// busier queue keeps filling.
    pub fn next_batch(&mut self) -> Option<MicroBatch> {
        let now = Instant::now();

        let mut candidate: Option<(ModelKey, Instant)> = None;
        for (key, queue) in &self.queues {
            let head = match queue.front() {
                Some(head) => head,
                None => continue,
            };
            let policy = self.policy_for(key);
            let waited = now.duration_since(head.created_at);
            let due = queue.len() >= policy.max_batch_size || waited >= policy.max_queue_delay;
            if !due {
                continue;
            }
            let is_older = candidate
                .as_ref()
                .map(|(_, oldest)| head.created_at < *oldest)
                .unwrap_or(true);
            if is_older {
                candidate = Some((key.clone(), head.created_at));
            }
        }

        let (key, _) = candidate?;
        let policy = self.policy_for(&key);
        let queue = self.queues.get_mut(&key)?;
        let take = policy.batch_take(queue.len());

        let batch_id = self.next_batch_id;
        self.next_batch_id = self.next_batch_id.wrapping_add(1);
        let mut batch = MicroBatch::new(batch_id, key.clone());

        for _ in 0..take {
            let mut request = match queue.pop_front() {
                Some(request) => request,
                None => break,
            };
            match request.start_processing() {
                Ok(()) => {
                    self.processing.insert(request.request_id, request.clone());
                    batch.requests.push(request);
                }
                Err(_) => {
                    // Only Pending requests live in queues; anything else is
                    // a bookkeeping bug, drop it rather than batch it.
                    debug!(request_id = request.request_id, "dropping non-pending request");
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            debug!(
                batch_id = batch.batch_id,
                model = %batch.key,
                size = batch.size(),
                "formed micro-batch"
            );
            Some(batch)
        }
    }

    fn insert_completed(&mut self, request: InferenceRequest) {
        self.completed_order.push_back(request.request_id);
        self.completed.insert(request.request_id, request);
        while self.completed_order.len() > self.config.max_completed_retained {
            if let Some(old_id) = self.completed_order.pop_front() {
                self.completed.remove(&old_id);
            }
        }
    }

    /// Record a successful backend result for a processing request
    pub fn complete_request(
        &mut self,
        request_id: u32,
        outputs: Vec<Tensor>,
    ) -> SchedulerResult<InferenceRequest> {
        let mut request = self
            .processing
            .remove(&request_id)
            .ok_or(SchedulerError::RequestNotFound(request_id))?;
        if let Err(e) = request.complete(outputs) {
            self.processing.insert(request_id, request);
            return Err(e);
        }
        self.insert_completed(request.clone());
        Ok(request)
    }

    /// Record a backend failure for a processing request
    pub fn fail_request(
        &mut self,
        request_id: u32,
        error: impl Into<String>,
    ) -> SchedulerResult<InferenceRequest> {
        let mut request = self
            .processing
            .remove(&request_id)
            .ok_or(SchedulerError::RequestNotFound(request_id))?;
        if let Err(e) = request.fail(error) {
            self.processing.insert(request_id, request);
            return Err(e);
        }
        self.insert_completed(request.clone());
        Ok(request)
    }

    /// Cancel a pending or processing request
    ///
    /// A request cancelled while processing keeps executing on its backend;
    /// the dispatch pool drops its result when completion finds it gone.
    /// Cancelling an already-cancelled request is idempotent.
    pub fn cancel(&mut self, request_id: u32) -> SchedulerResult<InferenceRequest> {
        if let Some(mut request) = self.processing.remove(&request_id) {
            request.cancel()?;
            self.insert_completed(request.clone());
            return Ok(request);
        }

        for queue in self.queues.values_mut() {
            if let Some(pos) = queue.iter().position(|r| r.request_id == request_id) {
                // Position was just found, remove cannot miss
                let mut request = queue
                    .remove(pos)
                    .expect("request disappeared between position() and remove()");
                request.cancel()?;
                self.insert_completed(request.clone());
                return Ok(request);
            }
        }

        if let Some(request) = self.completed.get(&request_id) {
            if request.state == RequestState::Cancelled {
                return Ok(request.clone());
            }
            return Err(SchedulerError::InvalidStateTransition);
        }

        Err(SchedulerError::RequestNotFound(request_id))
    }

    /// Look up a request in any of the three stores
    pub fn get_request(&self, request_id: u32) -> SchedulerResult<&InferenceRequest> {
        self.processing
            .get(&request_id)
            .or_else(|| self.completed.get(&request_id))
            .or_else(|| {
                self.queues
                    .values()
                    .flat_map(|q| q.iter())
                    .find(|r| r.request_id == request_id)
            })
            .ok_or(SchedulerError::RequestNotFound(request_id))
    }

    /// Whether any pending requests are queued
    pub fn has_pending(&self) -> bool {
        self.queues.values().any(|q| !q.is_empty())
    }

    /// Snapshot of queue depths
    pub fn stats(&self) -> QueueStats {
        let mut pending_per_model: HashMap<String, usize> = HashMap::new();
        let mut pending = 0;
        for (key, queue) in &self.queues {
            pending += queue.len();
            *pending_per_model.entry(key.name.clone()).or_default() += queue.len();
        }
        QueueStats {
            pending_requests: pending,
            processing_requests: self.processing.len(),
            completed_requests: self.completed.len(),
            pending_per_model,
        }
    }
}
