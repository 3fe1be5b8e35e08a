//! Configuration Module
//!
//! Runtime settings read from an optional TOML file. Every field has a
//! default, so a missing file still yields a working setup. Image size,
//! normalization constants and the TTA transform set are not configurable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::preprocess::sharpness::DEFAULT_BLUR_THRESHOLD;
use crate::taxonomy::NUM_CLASSES;
use crate::utils::error::{DiagnosisError, Result, ResultExt};
use crate::utils::logging::LogConfig;

/// Which runtime executes the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// Burn `PlantClassifier` from a CompactRecorder checkpoint
    #[default]
    Burn,
    /// ONNX Runtime session pool (cargo feature `onnx`)
    Onnx,
}

impl std::fmt::Display for EngineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineBackend::Burn => write!(f, "burn"),
            EngineBackend::Onnx => write!(f, "onnx"),
        }
    }
}

/// Classifier model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub backend: EngineBackend,

    /// Checkpoint (`.mpk`) or ONNX file
    pub path: PathBuf,

    /// Length of the model's logit vector
    pub num_classes: usize,

    /// Burn CNN width; must match the checkpoint
    pub base_filters: usize,

    /// ONNX session pool size
    pub sessions: usize,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Burn,
            path: PathBuf::from("models/plant_classifier.mpk"),
            num_classes: NUM_CLASSES,
            base_filters: 32,
            sessions: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurSection {
    /// Laplacian variance below which a photo is rejected
    pub threshold: f64,
}

impl Default for BlurSection {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BLUR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    /// Three-view TTA ensemble; `false` runs a single forward pass
    pub tta: bool,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self { tta: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomySection {
    /// JSON manifest; the built-in PlantVillage taxonomy when absent
    pub path: Option<PathBuf>,
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    pub model: ModelSection,
    pub blur: BlurSection,
    pub inference: InferenceSection,
    pub taxonomy: TaxonomySection,
    pub logging: LogConfig,
}

impl DiagnosisConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Read and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_model_path(mut self, path: PathBuf) -> Self {
        self.model.path = path;
        self
    }

    pub fn with_taxonomy_path(mut self, path: PathBuf) -> Self {
        self.taxonomy.path = Some(path);
        self
    }

    pub fn with_blur_threshold(mut self, threshold: f64) -> Self {
        self.blur.threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.blur.threshold.is_finite() && self.blur.threshold > 0.0) {
            return Err(DiagnosisError::Config(format!(
                "blur.threshold must be a positive number, got {}",
                self.blur.threshold
            )));
        }
        if self.model.num_classes == 0 {
            return Err(DiagnosisError::Config(
                "model.num_classes must be greater than zero".to_string(),
            ));
        }
        if self.model.sessions == 0 {
            return Err(DiagnosisError::Config(
                "model.sessions must be at least 1".to_string(),
            ));
        }
        if self.model.base_filters == 0 {
            return Err(DiagnosisError::Config(
                "model.base_filters must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
