//! Batching scheduler
//!
//! Accumulates inbound inference requests per model version and forms
//! micro-batches under latency/size bounds. Requests move through three
//! stores (pending queues, processing, completed) with an explicit state
//! machine per request.

pub mod batch;
pub mod queue;
pub mod scheduler;
pub mod types;

pub use batch::{MicroBatch, QueuePolicy, SchedulerConfig};
pub use queue::QueueStats;
pub use scheduler::BatchScheduler;
pub use types::{InferenceRequest, RequestState, SchedulerError, SchedulerResult};
