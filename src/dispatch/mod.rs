//! Dispatch worker pool
//!
//! Executes micro-batches against model backends with per-model concurrency
//! limits, retry/backoff for temporary backend errors, and registry-backed
//! output validation before requests complete.

pub mod backend;
pub mod pool;

pub use backend::{
    BackendError, BackendRegistry, BackendResult, BatchPayload, LoopbackBackend, ModelBackend,
    RequestOutputs, RequestPayload, LOOPBACK_BACKEND,
};
pub use pool::{DispatchConfig, DispatchPool, RetryConfig};
