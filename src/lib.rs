//! ModelGate - model-serving request router and batching gateway
//!
//! Accepts inference requests over HTTP, routes them to loaded model
//! versions, accumulates them into micro-batches under latency/size bounds,
//! dispatches batches to model backends with per-model concurrency limits,
//! and validates results against declared schemas before returning them.

pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod scheduler;

pub use dispatch::{BackendRegistry, DispatchPool, LoopbackBackend, ModelBackend};
pub use error::{ErrorCategory, GateResult, ModelGateError};
pub use gateway::{Gateway, GatewayConfig};
pub use registry::{DType, ModelConfig, ModelKey, ModelRegistry, Tensor, TensorData, TensorSchema};
pub use router::{InferParams, RequestRouter};
pub use scheduler::{BatchScheduler, InferenceRequest, MicroBatch, RequestState};
