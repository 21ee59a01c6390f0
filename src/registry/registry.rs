//! The model registry: versions, state, and schema validation

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::registry::model::{ModelConfig, ModelKey, ModelState, ModelVersion};
use crate::registry::schema::{validate_tensor, SchemaError, Tensor, TensorSchema};

/// Errors raised by registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("version {version} of model {model} not found")]
    VersionNotFound { model: String, version: u64 },
    #[error("model {model} version {version} is not ready")]
    ModelNotReady { model: String, version: u64 },
    #[error("missing {direction} tensor: {name}")]
    MissingInput { direction: String, name: String },
    #[error("unknown {direction} tensor: {name}")]
    UnknownTensor { direction: String, name: String },
    #[error("{0}")]
    DtypeMismatch(SchemaError),
    #[error("{0}")]
    ShapeMismatch(SchemaError),
    #[error("{0}")]
    ElementCountMismatch(SchemaError),
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

impl From<SchemaError> for RegistryError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Dtype { .. } => RegistryError::DtypeMismatch(err),
            SchemaError::Shape { .. } => RegistryError::ShapeMismatch(err),
            SchemaError::ElementCount { .. } | SchemaError::PayloadType { .. } => {
                RegistryError::ElementCountMismatch(err)
            }
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// One model with its shared configuration and registered versions
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub name: String,
    pub config: ModelConfig,
    pub versions: BTreeMap<u64, ModelVersion>,
}

impl ModelEntry {
    /// Highest version currently in the Ready state
    pub fn latest_ready(&self) -> Option<u64> {
        self.versions
            .iter()
            .rev()
            .find(|(_, v)| v.is_ready())
            .map(|(&n, _)| n)
    }

    /// Highest registered version regardless of state
    pub fn latest(&self) -> Option<u64> {
        self.versions.keys().next_back().copied()
    }
}

/// Summary row for the registry index endpoint
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelIndexEntry {
    pub name: String,
    pub version: u64,
    pub state: ModelState,
}

/// Tracks loaded model versions and their input/output schemas
///
/// The registry is the single source of truth for what is servable. Routing
/// resolves names against it, and the dispatch pool validates backend
/// outputs against the declared schemas before completing requests.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        ModelRegistry {
            models: HashMap::new(),
        }
    }

    /// Register a model version in the Loading state
    ///
    /// The first registration of a name installs its configuration; a
    /// duplicate (name, version) replaces the existing version entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        config: ModelConfig,
        version: u64,
        path: Option<PathBuf>,
    ) -> RegistryResult<ModelKey> {
        let name = name.into();
        config
            .validate()
            .map_err(RegistryError::InvalidConfig)?;

        let entry = self
            .models
            .entry(name.clone())
            .or_insert_with(|| ModelEntry {
                name: name.clone(),
                config: config.clone(),
                versions: BTreeMap::new(),
            });
        // Re-registering a model refreshes its shared configuration
        entry.config = config;
        entry
            .versions
            .insert(version, ModelVersion::new(version, path));

        info!(model = %name, version, "registered model version");
        Ok(ModelKey::new(name, version))
    }

    /// Remove a model version; the whole entry goes once no versions remain
    pub fn unregister(&mut self, key: &ModelKey) -> RegistryResult<()> {
        let entry = self
            .models
            .get_mut(&key.name)
            .ok_or_else(|| RegistryError::ModelNotFound(key.name.clone()))?;
        if entry.versions.remove(&key.version).is_none() {
            return Err(RegistryError::VersionNotFound {
                model: key.name.clone(),
                version: key.version,
            });
        }
        if entry.versions.is_empty() {
            self.models.remove(&key.name);
        }
        info!(model = %key.name, version = key.version, "unregistered model version");
        Ok(())
    }

    fn version_mut(&mut self, key: &ModelKey) -> RegistryResult<&mut ModelVersion> {
        let entry = self
            .models
            .get_mut(&key.name)
            .ok_or_else(|| RegistryError::ModelNotFound(key.name.clone()))?;
        entry
            .versions
            .get_mut(&key.version)
            .ok_or_else(|| RegistryError::VersionNotFound {
                model: key.name.clone(),
                version: key.version,
            })
    }

    /// Mark a version Ready; it starts serving traffic from this point
    pub fn mark_ready(&mut self, key: &ModelKey) -> RegistryResult<()> {
        self.version_mut(key)?.state = ModelState::Ready;
        info!(model = %key.name, version = key.version, "model version ready");
        Ok(())
    }

    /// Take a version out of rotation
    pub fn mark_unavailable(&mut self, key: &ModelKey) -> RegistryResult<()> {
        self.version_mut(key)?.state = ModelState::Unavailable;
        Ok(())
    }

    /// Resolve a model name and optional version to a servable key
    ///
    /// An explicit version must exist and be Ready. Without a version the
    /// highest Ready version wins; a model with versions but none Ready
    /// reports its latest version as not ready.
    pub fn resolve(&self, name: &str, version: Option<u64>) -> RegistryResult<ModelKey> {
        let entry = self
            .models
            .get(name)
            .ok_or_else(|| RegistryError::ModelNotFound(name.to_string()))?;

        match version {
            Some(v) => {
                let mv = entry.versions.get(&v).ok_or_else(|| {
                    RegistryError::VersionNotFound {
                        model: name.to_string(),
                        version: v,
                    }
                })?;
                if !mv.is_ready() {
                    return Err(RegistryError::ModelNotReady {
                        model: name.to_string(),
                        version: v,
                    });
                }
                Ok(ModelKey::new(name, v))
            }
            None => match entry.latest_ready() {
                Some(v) => Ok(ModelKey::new(name, v)),
                None => Err(RegistryError::ModelNotReady {
                    model: name.to_string(),
                    version: entry.latest().unwrap_or(0),
                }),
            },
        }
    }

    /// Look up a model entry by name
    pub fn entry(&self, name: &str) -> Option<&ModelEntry> {
        self.models.get(name)
    }

    /// Configuration for a registered version
    pub fn config_for(&self, key: &ModelKey) -> RegistryResult<&ModelConfig> {
        let entry = self
            .models
            .get(&key.name)
            .ok_or_else(|| RegistryError::ModelNotFound(key.name.clone()))?;
        if !entry.versions.contains_key(&key.version) {
            return Err(RegistryError::VersionNotFound {
                model: key.name.clone(),
                version: key.version,
            });
        }
        Ok(&entry.config)
    }

    /// Current state of a registered version
    pub fn state(&self, key: &ModelKey) -> RegistryResult<ModelState> {
        let entry = self
            .models
            .get(&key.name)
            .ok_or_else(|| RegistryError::ModelNotFound(key.name.clone()))?;
        entry
            .versions
            .get(&key.version)
            .map(|v| v.state)
            .ok_or_else(|| RegistryError::VersionNotFound {
                model: key.name.clone(),
                version: key.version,
            })
    }

    /// Whether a (name, optional version) pair is ready to serve
    pub fn is_ready(&self, name: &str, version: Option<u64>) -> bool {
        self.resolve(name, version).is_ok()
    }

    /// Index of every registered version, sorted by name then version
    pub fn list(&self) -> Vec<ModelIndexEntry> {
        let mut index: Vec<ModelIndexEntry> = self
            .models
            .values()
            .flat_map(|entry| {
                entry.versions.values().map(|v| ModelIndexEntry {
                    name: entry.name.clone(),
                    version: v.version,
                    state: v.state,
                })
            })
            .collect();
        index.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
        index
    }

    /// Number of registered models (names, not versions)
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Number of versions currently Ready across all models
    pub fn ready_count(&self) -> usize {
        self.models
            .values()
            .flat_map(|e| e.versions.values())
            .filter(|v| v.is_ready())
            .count()
    }

    fn validate_tensors(
        schemas: &[TensorSchema],
        tensors: &[Tensor],
        direction: &str,
    ) -> RegistryResult<()> {
        for schema in schemas {
            let tensor = tensors
                .iter()
                .find(|t| t.name == schema.name)
                .ok_or_else(|| RegistryError::MissingInput {
                    direction: direction.to_string(),
                    name: schema.name.clone(),
                })?;
            validate_tensor(schema, tensor)?;
        }
        for tensor in tensors {
            if !schemas.iter().any(|s| s.name == tensor.name) {
                return Err(RegistryError::UnknownTensor {
                    direction: direction.to_string(),
                    name: tensor.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validate request inputs against a model's declared input schemas
    pub fn validate_inputs(&self, key: &ModelKey, inputs: &[Tensor]) -> RegistryResult<()> {
        let config = self.config_for(key)?;
        Self::validate_tensors(&config.inputs, inputs, "input")
    }

    /// Validate backend outputs against a model's declared output schemas
    pub fn validate_outputs(&self, key: &ModelKey, outputs: &[Tensor]) -> RegistryResult<()> {
        let config = self.config_for(key)?;
        Self::validate_tensors(&config.outputs, outputs, "output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::schema::{DType, TensorData};

    fn echo_config() -> ModelConfig {
        ModelConfig {
            name: None,
            max_batch_size: 4,
            instance_count: 1,
            preferred_batch_sizes: vec![],
            max_queue_delay_ms: None,
            backend: None,
            inputs: vec![TensorSchema::new("in", DType::Fp32, vec![-1])],
            outputs: vec![TensorSchema::new("in", DType::Fp32, vec![-1])],
        }
    }

    fn input(len: usize) -> Tensor {
        Tensor::new(
            "in",
            DType::Fp32,
            vec![len as i64],
            TensorData::Fp64(vec![0.5; len]),
        )
    }

    #[test]
    fn test_register_and_resolve_explicit() {
        let mut registry = ModelRegistry::new();
        let key = registry.register("echo", echo_config(), 1, None).unwrap();

        // Loading versions do not serve
        assert!(matches!(
            registry.resolve("echo", Some(1)),
            Err(RegistryError::ModelNotReady { .. })
        ));

        registry.mark_ready(&key).unwrap();
        assert_eq!(registry.resolve("echo", Some(1)).unwrap(), key);
    }

    #[test]
    fn test_resolve_latest_ready() {
        let mut registry = ModelRegistry::new();
        let v1 = registry.register("echo", echo_config(), 1, None).unwrap();
        let v2 = registry.register("echo", echo_config(), 2, None).unwrap();
        let _v3 = registry.register("echo", echo_config(), 3, None).unwrap();

        registry.mark_ready(&v1).unwrap();
        registry.mark_ready(&v2).unwrap();
        // v3 is still Loading; latest ready is v2
        assert_eq!(registry.resolve("echo", None).unwrap().version, 2);
    }

    #[test]
    fn test_resolve_unknown_model() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.resolve("missing", None),
            Err(RegistryError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_version() {
        let mut registry = ModelRegistry::new();
        let key = registry.register("echo", echo_config(), 1, None).unwrap();
        registry.mark_ready(&key).unwrap();
        assert!(matches!(
            registry.resolve("echo", Some(9)),
            Err(RegistryError::VersionNotFound { version: 9, .. })
        ));
    }

    #[test]
    fn test_unregister_removes_empty_entry() {
        let mut registry = ModelRegistry::new();
        let key = registry.register("echo", echo_config(), 1, None).unwrap();
        registry.unregister(&key).unwrap();
        assert!(registry.entry("echo").is_none());
        assert_eq!(registry.model_count(), 0);
    }

    #[test]
    fn test_validate_inputs_ok() {
        let mut registry = ModelRegistry::new();
        let key = registry.register("echo", echo_config(), 1, None).unwrap();
        registry.mark_ready(&key).unwrap();
        assert!(registry.validate_inputs(&key, &[input(3)]).is_ok());
    }

    #[test]
    fn test_validate_inputs_missing_tensor() {
        let mut registry = ModelRegistry::new();
        let key = registry.register("echo", echo_config(), 1, None).unwrap();
        let err = registry.validate_inputs(&key, &[]).unwrap_err();
        assert!(matches!(err, RegistryError::MissingInput { .. }));
    }

    #[test]
    fn test_validate_inputs_unknown_tensor() {
        let mut registry = ModelRegistry::new();
        let key = registry.register("echo", echo_config(), 1, None).unwrap();
        let stray = Tensor::new(
            "stray",
            DType::Fp32,
            vec![1],
            TensorData::Fp64(vec![1.0]),
        );
        let err = registry
            .validate_inputs(&key, &[input(1), stray])
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTensor { .. }));
    }

    #[test]
    fn test_list_sorted() {
        let mut registry = ModelRegistry::new();
        registry.register("b_model", echo_config(), 1, None).unwrap();
        registry.register("a_model", echo_config(), 2, None).unwrap();
        registry.register("a_model", echo_config(), 1, None).unwrap();

        let index = registry.list();
        assert_eq!(index.len(), 3);
        assert_eq!(index[0].name, "a_model");
        assert_eq!(index[0].version, 1);
        assert_eq!(index[1].version, 2);
        assert_eq!(index[2].name, "b_model");
    }

    #[test]
    fn test_ready_count() {
        let mut registry = ModelRegistry::new();
        let v1 = registry.register("echo", echo_config(), 1, None).unwrap();
        registry.register("echo", echo_config(), 2, None).unwrap();
        registry.mark_ready(&v1).unwrap();
        assert_eq!(registry.model_count(), 1);
        assert_eq!(registry.ready_count(), 1);
    }
}
