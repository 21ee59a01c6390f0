//! Core types for the batching scheduler

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::registry::{ModelKey, Tensor};

/// Errors that can occur during scheduling operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("request not found: {0}")]
    RequestNotFound(u32),
    #[error("queue capacity exceeded for model {model}")]
    QueueCapacityExceeded { model: String },
    #[error("invalid request state transition")]
    InvalidStateTransition,
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// State of an inference request in the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RequestState {
    /// Wire representation used in status responses
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Processing => "processing",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        }
    }
}

/// A single inference request in the scheduler
///
/// Tracks the complete lifecycle from submission through completion:
/// the target model version, input tensors, state transitions, timestamps,
/// and (once a backend has run) output tensors or an error message.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub request_id: u32,
    pub key: ModelKey,
    pub inputs: Vec<Tensor>,
    /// Caller-supplied correlation id, echoed in responses
    pub correlation_id: Option<String>,
    /// Recorded for operators; the shipped queue policy is FIFO
    pub priority: u32,
    pub state: RequestState,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
    pub outputs: Vec<Tensor>,
    pub error: Option<String>,
}

impl InferenceRequest {
    pub fn new(
        request_id: u32,
        key: ModelKey,
        inputs: Vec<Tensor>,
        correlation_id: Option<String>,
        priority: u32,
    ) -> Self {
        InferenceRequest {
            request_id,
            key,
            inputs,
            correlation_id,
            priority,
            state: RequestState::Pending,
            created_at: Instant::now(),
            started_at: None,
            completed_at: None,
            outputs: Vec::new(),
            error: None,
        }
    }

    /// Total elements across all input tensors
    pub fn input_elements(&self) -> usize {
        self.inputs.iter().map(|t| t.data.len()).sum()
    }

    /// Whether the request reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled
        )
    }

    /// Transition to processing
    pub fn start_processing(&mut self) -> SchedulerResult<()> {
        if self.state != RequestState::Pending {
            return Err(SchedulerError::InvalidStateTransition);
        }
        self.state = RequestState::Processing;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Transition to completed with the backend's outputs
    pub fn complete(&mut self, outputs: Vec<Tensor>) -> SchedulerResult<()> {
        if self.state != RequestState::Processing {
            return Err(SchedulerError::InvalidStateTransition);
        }
        self.state = RequestState::Completed;
        self.completed_at = Some(Instant::now());
        self.outputs = outputs;
        Ok(())
    }

    /// Transition to failed with an error message
    pub fn fail(&mut self, error: impl Into<String>) -> SchedulerResult<()> {
        if self.state != RequestState::Processing {
            return Err(SchedulerError::InvalidStateTransition);
        }
        self.state = RequestState::Failed;
        self.completed_at = Some(Instant::now());
        self.error = Some(error.into());
        Ok(())
    }

    /// Cancel the request from Pending or Processing
    pub fn cancel(&mut self) -> SchedulerResult<()> {
        if self.is_finished() {
            return Err(SchedulerError::InvalidStateTransition);
        }
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.state = RequestState::Cancelled;
        self.completed_at = Some(Instant::now());
        Ok(())
    }

    /// Time spent waiting in the pending queue
    pub fn queue_wait(&self) -> Option<Duration> {
        self.started_at
            .map(|started| started.duration_since(self.created_at))
    }

    /// Time spent in processing, or elapsed so far if still running
    pub fn execution_time(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            (Some(start), None) => Some(Instant::now().duration_since(start)),
            _ => None,
        }
    }
}
