//! Filesystem model repository scanning
//!
//! A model repository is a directory tree the gateway reads at startup to
//! discover servable models:
//!
//! ```text
//! <repository>/
//!   plate_detect/
//!     config.json
//!     1/
//!     2/
//! ```
//!
//! Version directories are positive integers; anything else is skipped with
//! a warning, as is a model directory without a `config.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::registry::model::ModelConfig;

/// Environment variable naming the model repository directory
pub const MODEL_REPOSITORY_ENV: &str = "MODELGATE_MODEL_REPOSITORY";

/// Default repository directory relative to the working directory
const DEFAULT_REPOSITORY_DIR: &str = "models";

/// A model found on disk, with its parsed configuration and version dirs
#[derive(Debug, Clone)]
pub struct DiscoveredModel {
    pub name: String,
    pub config: ModelConfig,
    /// (version, artifact directory), ascending by version
    pub versions: Vec<(u64, PathBuf)>,
}

/// Resolve the repository directory from an override, the environment, or
/// the default location
pub fn resolve_repository_dir(dir_override: Option<&str>) -> PathBuf {
    dir_override
        .map(PathBuf::from)
        .or_else(|| std::env::var(MODEL_REPOSITORY_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPOSITORY_DIR))
}

/// Scan a repository directory for servable models
///
/// A missing repository yields an empty list; the gateway still starts and
/// serves health endpoints.
pub fn scan_repository(base_dir: &Path) -> Result<Vec<DiscoveredModel>> {
    if !base_dir.exists() {
        warn!(
            "model repository {} does not exist; starting with no models",
            base_dir.display()
        );
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(base_dir)
        .with_context(|| format!("failed to read repository {}", base_dir.display()))?;

    let mut discovered = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match scan_model_dir(&path)? {
            Some(model) => discovered.push(model),
            None => continue,
        }
    }

    discovered.sort_by(|a, b| a.name.cmp(&b.name));
    info!(
        models = discovered.len(),
        "scanned model repository {}",
        base_dir.display()
    );
    Ok(discovered)
}

fn scan_model_dir(model_dir: &Path) -> Result<Option<DiscoveredModel>> {
    let name = match model_dir.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_string(),
        None => return Ok(None),
    };

    let config_path = model_dir.join("config.json");
    if !config_path.exists() {
        warn!(
            "skipping {}: no config.json found",
            model_dir.display()
        );
        return Ok(None);
    }

    let raw = fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let mut config: ModelConfig = match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!("skipping {}: malformed config.json: {}", model_dir.display(), e);
            return Ok(None);
        }
    };
    if config.name.is_none() {
        config.name = Some(name.clone());
    }
    if let Err(msg) = config.validate() {
        warn!("skipping {}: {}", model_dir.display(), msg);
        return Ok(None);
    }

    let versions = collect_version_dirs(model_dir)?;
    if versions.is_empty() {
        warn!(
            "skipping {}: no numeric version directories",
            model_dir.display()
        );
        return Ok(None);
    }

    Ok(Some(DiscoveredModel {
        name,
        config,
        versions,
    }))
}

fn collect_version_dirs(model_dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let entries = fs::read_dir(model_dir)
        .with_context(|| format!("failed to read {}", model_dir.display()))?;

    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let dir_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        match dir_name.parse::<u64>() {
            Ok(version) if version > 0 => versions.push((version, path)),
            _ => {
                warn!(
                    "ignoring non-version directory {} in {}",
                    dir_name,
                    model_dir.display()
                );
            }
        }
    }

    versions.sort_by_key(|(v, _)| *v);
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO_CONFIG: &str = r#"{
        "max_batch_size": 4,
        "inputs": [{"name": "in", "datatype": "FP32", "dims": [-1]}],
        "outputs": [{"name": "in", "datatype": "FP32", "dims": [-1]}]
    }"#;

    fn write_model(repo: &Path, name: &str, versions: &[&str]) {
        let model_dir = repo.join(name);
        fs::create_dir_all(&model_dir).unwrap();
        fs::write(model_dir.join("config.json"), ECHO_CONFIG).unwrap();
        for v in versions {
            fs::create_dir_all(model_dir.join(v)).unwrap();
        }
    }

    #[test]
    fn test_scan_missing_repository_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let models = scan_repository(&missing).unwrap();
        assert!(models.is_empty());
    }

    #[test]
    fn test_scan_discovers_models_and_versions() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "echo", &["1", "3", "2"]);
        write_model(dir.path(), "plate_detect", &["1"]);

        let models = scan_repository(dir.path()).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "echo");
        let versions: Vec<u64> = models[0].versions.iter().map(|(v, _)| *v).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(models[1].name, "plate_detect");
    }

    #[test]
    fn test_scan_skips_dir_without_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("stray/1")).unwrap();
        write_model(dir.path(), "echo", &["1"]);

        let models = scan_repository(dir.path()).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "echo");
    }

    #[test]
    fn test_scan_ignores_non_numeric_versions() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "echo", &["1", "latest", "0"]);

        let models = scan_repository(dir.path()).unwrap();
        assert_eq!(models.len(), 1);
        let versions: Vec<u64> = models[0].versions.iter().map(|(v, _)| *v).collect();
        assert_eq!(versions, vec![1]);
    }

    #[test]
    fn test_scan_skips_model_with_no_versions() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("empty");
        fs::create_dir_all(&model_dir).unwrap();
        fs::write(model_dir.join("config.json"), ECHO_CONFIG).unwrap();

        let models = scan_repository(dir.path()).unwrap();
        assert!(models.is_empty());
    }

    #[test]
    fn test_config_name_defaults_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "echo", &["1"]);

        let models = scan_repository(dir.path()).unwrap();
        assert_eq!(models[0].config.name.as_deref(), Some("echo"));
    }

    #[test]
    fn test_resolve_repository_dir_override_wins() {
        let resolved = resolve_repository_dir(Some("/tmp/custom-repo"));
        assert_eq!(resolved, PathBuf::from("/tmp/custom-repo"));
    }
}
