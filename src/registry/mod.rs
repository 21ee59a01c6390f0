//! Model registry
//!
//! Tracks loaded model versions and their input/output schemas. The registry
//! resolves inbound (name, version) pairs to servable versions, validates
//! request inputs and backend outputs against declared schemas, and scans a
//! filesystem model repository at startup.

pub mod model;
pub mod registry;
pub mod repository;
pub mod schema;

pub use model::{ModelConfig, ModelKey, ModelState, ModelVersion};
pub use registry::{ModelEntry, ModelIndexEntry, ModelRegistry, RegistryError, RegistryResult};
pub use repository::{
    resolve_repository_dir, scan_repository, DiscoveredModel, MODEL_REPOSITORY_ENV,
};
pub use schema::{validate_tensor, DType, SchemaError, Tensor, TensorData, TensorSchema};
