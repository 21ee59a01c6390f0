//! Model backend seam
//!
//! Backends execute micro-batches. The trait is synchronous; the dispatch
//! pool runs it under `tokio::task::spawn_blocking` so a slow backend never
//! stalls the async runtime. Real serving runtimes plug in behind this
//! trait; the built-in `loopback` backend echoes inputs to outputs for
//! smoke paths and tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::registry::{ModelKey, Tensor};

/// Errors raised by backend execution
#[derive(Debug, Error)]
pub enum BackendError {
    /// Temporary condition; the dispatch pool retries these
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Execution failed; not retried
    #[error("backend execution failed: {0}")]
    Execution(String),
    /// Backend returned the wrong number of per-request result sets
    #[error("backend returned {actual} result sets, expected {expected}")]
    OutputMismatch { expected: usize, actual: usize },
}

impl BackendError {
    /// Whether the dispatch pool should retry after a backoff
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Inputs of one request within a batch payload
#[derive(Debug, Clone)]
pub struct RequestPayload {
    pub request_id: u32,
    pub inputs: Vec<Tensor>,
}

/// A micro-batch as handed to a backend
#[derive(Debug, Clone)]
pub struct BatchPayload {
    pub key: ModelKey,
    pub requests: Vec<RequestPayload>,
}

impl BatchPayload {
    pub fn size(&self) -> usize {
        self.requests.len()
    }
}

/// Outputs of one request, as returned by a backend
#[derive(Debug, Clone)]
pub struct RequestOutputs {
    pub request_id: u32,
    pub outputs: Vec<Tensor>,
}

/// A model execution backend
///
/// `execute` must return exactly one `RequestOutputs` per payload request,
/// in any order. Implementations may block; they are never called on the
/// async runtime directly.
pub trait ModelBackend: Send + Sync {
    /// Backend name, used for registration and model config lookup
    fn name(&self) -> &str;

    /// Execute a micro-batch and produce per-request outputs
    fn execute(&self, batch: &BatchPayload) -> BackendResult<Vec<RequestOutputs>>;
}

impl fmt::Debug for dyn ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelBackend({})", self.name())
    }
}

/// Name of the built-in echo backend
pub const LOOPBACK_BACKEND: &str = "loopback";

/// Echoes each request's inputs back as its outputs
#[derive(Debug, Default)]
pub struct LoopbackBackend;

impl ModelBackend for LoopbackBackend {
    fn name(&self) -> &str {
        LOOPBACK_BACKEND
    }

    fn execute(&self, batch: &BatchPayload) -> BackendResult<Vec<RequestOutputs>> {
        Ok(batch
            .requests
            .iter()
            .map(|r| RequestOutputs {
                request_id: r.request_id,
                outputs: r.inputs.clone(),
            })
            .collect())
    }
}

/// Name → backend map with a default for models that declare none
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
    default_backend: String,
}

impl BackendRegistry {
    /// Create a registry with the loopback backend installed as default
    pub fn new() -> Self {
        let mut backends: HashMap<String, Arc<dyn ModelBackend>> = HashMap::new();
        backends.insert(LOOPBACK_BACKEND.to_string(), Arc::new(LoopbackBackend));
        BackendRegistry {
            backends,
            default_backend: LOOPBACK_BACKEND.to_string(),
        }
    }

    /// Register a backend under its own name
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Change which backend models without a `backend` config field use
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_backend = name.into();
    }

    /// Resolve a backend by optional name, falling back to the default
    pub fn get(&self, name: Option<&str>) -> BackendResult<Arc<dyn ModelBackend>> {
        let name = name.unwrap_or(&self.default_backend);
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::Unavailable(format!("no backend named {name}")))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("default_backend", &self.default_backend)
            .finish()
    }
}
