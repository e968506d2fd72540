//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use flower_id::classifier::validate_threshold;
use flower_id::embedding::DEFAULT_GRID;
use flower_id::reference::{DEFAULT_PATTERN, DEFAULT_SAMPLES_PER_CATEGORY};
use flower_id::{
    Category, FlowerError, FlowerResult, Preprocess, ReferenceSet, SampleLayout,
    DEFAULT_REJECTION_THRESHOLD,
};

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "flower-id.json";

pub const ENV_CONFIG: &str = "FLOWER_ID_CONFIG";
pub const ENV_DATASET: &str = "FLOWER_ID_DATASET";
pub const ENV_MODEL: &str = "FLOWER_ID_MODEL";
pub const ENV_CAMERA: &str = "FLOWER_ID_CAMERA";

/// ONNX extractor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to an ONNX feature extractor. Without one the colour-grid
    /// extractor is used.
    pub path: Option<PathBuf>,
    pub preprocess: Preprocess,
    pub l2_normalize: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            preprocess: Preprocess::default(),
            l2_normalize: false,
        }
    }
}

/// Full application configuration, as read from `flower-id.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub categories: Vec<Category>,
    pub samples_per_category: usize,
    pub dataset: PathBuf,
    pub pattern: String,
    pub rejection_threshold: f64,
    pub model: ModelConfig,
    /// Cells per side for the colour-grid extractor.
    pub grid: u32,
    /// Snapshot file used by `capture` and the REPL.
    pub camera: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            categories: ReferenceSet::default().categories,
            samples_per_category: DEFAULT_SAMPLES_PER_CATEGORY,
            dataset: PathBuf::from("dataset"),
            pattern: DEFAULT_PATTERN.to_string(),
            rejection_threshold: DEFAULT_REJECTION_THRESHOLD,
            model: ModelConfig::default(),
            grid: DEFAULT_GRID,
            camera: None,
        }
    }
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub dataset: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub camera: Option<PathBuf>,
}

impl AppConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> FlowerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            FlowerError::InvalidInput(format!("Invalid config {}: {e}", path.display()))
        })
    }

    /// Resolve the effective configuration from the process environment.
    pub fn resolve(overrides: &Overrides) -> FlowerResult<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// Precedence per setting: command line, environment, config file,
    /// built-in default.
    pub fn resolve_with<F>(overrides: &Overrides, env: F) -> FlowerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match resolve_config_path(overrides.config.as_deref(), &env) {
            Some(path) => {
                tracing::debug!("Reading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        if let Some(dataset) = overrides
            .dataset
            .clone()
            .or_else(|| env(ENV_DATASET).map(PathBuf::from))
        {
            config.dataset = dataset;
        }
        if let Some(model) = overrides
            .model
            .clone()
            .or_else(|| env(ENV_MODEL).map(PathBuf::from))
        {
            config.model.path = Some(model);
        }
        if let Some(camera) = overrides
            .camera
            .clone()
            .or_else(|| env(ENV_CAMERA).map(PathBuf::from))
        {
            config.camera = Some(camera);
        }
        if let Some(threshold) = overrides.threshold {
            config.rejection_threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching the dataset.
    pub fn validate(&self) -> FlowerResult<()> {
        self.reference_set().validate()?;
        self.layout().validate()?;
        validate_threshold(self.rejection_threshold)?;
        if self.grid == 0 {
            return Err(FlowerError::InvalidInput("grid must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn reference_set(&self) -> ReferenceSet {
        ReferenceSet {
            categories: self.categories.clone(),
            samples_per_category: self.samples_per_category,
        }
    }

    pub fn layout(&self) -> SampleLayout {
        SampleLayout::new(self.dataset.clone(), self.pattern.clone())
    }
}

/// Pick the config file: explicit path, `$FLOWER_ID_CONFIG`, then
/// `./flower-id.json` if it exists.
fn resolve_config_path<F>(explicit: Option<&Path>, env: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(env_path) = env(ENV_CONFIG) {
        return Some(PathBuf::from(env_path));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    local.exists().then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.samples_per_category, 6);
        assert_eq!(config.rejection_threshold, 40.0);
        assert_eq!(
            config.layout().sample_path(&Category::from("lotus"), 2),
            PathBuf::from("dataset/lotus/l2.jpg")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(
            &path,
            r#"{ "categories": ["daisy", "orchid"], "samples_per_category": 3 }"#,
        )
        .unwrap();

        let overrides = Overrides {
            config: Some(path),
            ..Overrides::default()
        };
        let config = AppConfig::resolve_with(&overrides, no_env).unwrap();
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.samples_per_category, 3);
        assert_eq!(config.pattern, DEFAULT_PATTERN);
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_clip_preprocess_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(
            &path,
            r#"{ "model": { "path": "clip.onnx", "l2_normalize": true,
                 "preprocess": { "layout": "nchw", "normalization": { "kind": "clip" } } } }"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        let preprocess = config.model.preprocess;
        assert_eq!(preprocess.normalization, flower_id::Normalization::Clip);
        assert_eq!(preprocess.layout, flower_id::TensorLayout::Nchw);
        assert_eq!(preprocess.input_size, Preprocess::default().input_size);
        assert!(config.model.l2_normalize);
    }

    #[test]
    fn test_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "dataset": "from-file", "rejection_threshold": 55 }"#).unwrap();

        let env: HashMap<&str, &str> = [(ENV_DATASET, "from-env"), (ENV_MODEL, "env.onnx")]
            .into_iter()
            .collect();
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        let overrides = Overrides {
            config: Some(path.clone()),
            ..Overrides::default()
        };
        let config = AppConfig::resolve_with(&overrides, lookup).unwrap();
        assert_eq!(config.dataset, PathBuf::from("from-env"));
        assert_eq!(config.model.path, Some(PathBuf::from("env.onnx")));
        assert_eq!(config.rejection_threshold, 55.0);

        let overrides = Overrides {
            config: Some(path),
            dataset: Some(PathBuf::from("from-cli")),
            threshold: Some(12.5),
            ..Overrides::default()
        };
        let config = AppConfig::resolve_with(&overrides, lookup).unwrap();
        assert_eq!(config.dataset, PathBuf::from("from-cli"));
        assert_eq!(config.rejection_threshold, 12.5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let overrides = Overrides {
            threshold: Some(150.0),
            config: Some(PathBuf::from("/nonexistent/flower-id.json")),
            ..Overrides::default()
        };
        // Missing explicit config file is an IO error.
        assert!(matches!(
            AppConfig::resolve_with(&overrides, no_env),
            Err(FlowerError::Io(_))
        ));

        let mut config = AppConfig::default();
        config.rejection_threshold = 150.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.samples_per_category = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.grid = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(FlowerError::InvalidInput(_))
        ));
    }
}
