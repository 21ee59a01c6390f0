//! Model identity, configuration, and version state

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::registry::schema::TensorSchema;

/// Canonical identity of a servable model version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub name: String,
    pub version: u64,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        ModelKey {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

fn default_max_batch_size() -> usize {
    8
}

fn default_instance_count() -> usize {
    1
}

/// Per-model configuration, loaded from `config.json` in the model directory
///
/// Batching fields mirror a dynamic-batcher configuration: `max_batch_size`
/// bounds batch size, `preferred_batch_sizes` lists sizes the scheduler
/// favors once a queue is due, and `max_queue_delay_ms` overrides the global
/// batching timeout for this model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name; defaults to the directory name when omitted
    #[serde(default)]
    pub name: Option<String>,

    /// Maximum requests per micro-batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Number of batches of this model that may execute concurrently
    #[serde(default = "default_instance_count")]
    pub instance_count: usize,

    /// Batch sizes the scheduler prefers when forming a batch
    #[serde(default)]
    pub preferred_batch_sizes: Vec<usize>,

    /// Per-model override of the global batching timeout
    #[serde(default)]
    pub max_queue_delay_ms: Option<u64>,

    /// Backend to execute this model on; defaults to the pool's default
    #[serde(default)]
    pub backend: Option<String>,

    /// Declared input tensors
    pub inputs: Vec<TensorSchema>,

    /// Declared output tensors
    pub outputs: Vec<TensorSchema>,
}

impl ModelConfig {
    /// Validate internal consistency of a parsed configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be > 0".to_string());
        }
        if self.instance_count == 0 {
            return Err("instance_count must be > 0".to_string());
        }
        if self.inputs.is_empty() {
            return Err("at least one input must be declared".to_string());
        }
        if self.outputs.is_empty() {
            return Err("at least one output must be declared".to_string());
        }
        if let Some(&p) = self
            .preferred_batch_sizes
            .iter()
            .find(|&&p| p == 0 || p > self.max_batch_size)
        {
            return Err(format!(
                "preferred batch size {} outside (0, max_batch_size={}]",
                p, self.max_batch_size
            ));
        }
        Ok(())
    }
}

/// Lifecycle state of a model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelState {
    Loading,
    Ready,
    Unavailable,
    Unloading,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelState::Loading => write!(f, "LOADING"),
            ModelState::Ready => write!(f, "READY"),
            ModelState::Unavailable => write!(f, "UNAVAILABLE"),
            ModelState::Unloading => write!(f, "UNLOADING"),
        }
    }
}

/// A single registered version of a model
#[derive(Debug, Clone)]
pub struct ModelVersion {
    pub version: u64,
    pub state: ModelState,
    /// Artifact directory on disk, when the version came from a repository
    pub path: Option<PathBuf>,
}

impl ModelVersion {
    pub fn new(version: u64, path: Option<PathBuf>) -> Self {
        ModelVersion {
            version,
            state: ModelState::Loading,
            path,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ModelState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::schema::DType;

    fn minimal_config() -> ModelConfig {
        ModelConfig {
            name: None,
            max_batch_size: 8,
            instance_count: 1,
            preferred_batch_sizes: vec![],
            max_queue_delay_ms: None,
            backend: None,
            inputs: vec![TensorSchema::new("in", DType::Fp32, vec![-1])],
            outputs: vec![TensorSchema::new("out", DType::Fp32, vec![-1])],
        }
    }

    #[test]
    fn test_model_key_display() {
        let key = ModelKey::new("plate_detect", 2);
        assert_eq!(key.to_string(), "plate_detect:2");
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: ModelConfig = serde_json::from_str(
            r#"{
                "inputs": [{"name": "in", "datatype": "FP32", "dims": [-1]}],
                "outputs": [{"name": "out", "datatype": "FP32", "dims": [-1]}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_batch_size, 8);
        assert_eq!(config.instance_count, 1);
        assert!(config.preferred_batch_sizes.is_empty());
        assert!(config.backend.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate_rejects_zero_batch() {
        let mut config = minimal_config();
        config.max_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_bad_preferred_sizes() {
        let mut config = minimal_config();
        config.preferred_batch_sizes = vec![4, 16];
        let err = config.validate().unwrap_err();
        assert!(err.contains("preferred batch size 16"));
    }

    #[test]
    fn test_config_validate_requires_schemas() {
        let mut config = minimal_config();
        config.outputs.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_version_starts_loading() {
        let version = ModelVersion::new(1, None);
        assert_eq!(version.state, ModelState::Loading);
        assert!(!version.is_ready());
    }

    #[test]
    fn test_model_state_serializes_uppercase() {
        let json = serde_json::to_string(&ModelState::Ready).unwrap();
        assert_eq!(json, "\"READY\"");
    }
}
