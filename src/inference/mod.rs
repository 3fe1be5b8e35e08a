//! Inference module: model execution and species-constrained classification
//!
//! This module provides:
//! - The `ClassifierEngine` abstraction and the lazily-loaded `ModelHandle`
//! - Burn and (feature `onnx`) ONNX Runtime engines
//! - The TTA ensemble and masked classification
//! - The end-to-end `Diagnoser`

pub mod burn_engine;
pub mod classify;
pub mod engine;
pub mod ensemble;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod predictor;

use std::sync::Arc;

use crate::config::{EngineBackend, ModelSection};
use crate::model::PlantClassifierConfig;
use crate::utils::error::Result;

// Re-export main types for convenience
pub use burn_engine::BurnEngine;
pub use classify::{classify, classify_species, masked_softmax, ClassifyResult};
pub use engine::{ClassifierEngine, LogitVector, ModelHandle};
pub use ensemble::{average_logits, ensemble_forward};
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;
pub use predictor::{Diagnoser, PassMode};

/// Load the engine described by the model settings
pub fn load_engine(model: &ModelSection) -> Result<Arc<dyn ClassifierEngine>> {
    match model.backend {
        EngineBackend::Burn => {
            let config = PlantClassifierConfig::new()
                .with_num_classes(model.num_classes)
                .with_base_filters(model.base_filters);
            Ok(Arc::new(BurnEngine::load(&model.path, config)?))
        }
        #[cfg(feature = "onnx")]
        EngineBackend::Onnx => Ok(Arc::new(OnnxEngine::load(
            &model.path,
            model.num_classes,
            model.sessions,
        )?)),
        #[cfg(not(feature = "onnx"))]
        EngineBackend::Onnx => Err(crate::utils::error::DiagnosisError::Config(
            "model.backend = \"onnx\" needs the `onnx` cargo feature".to_string(),
        )),
    }
}

/// A handle that loads the configured engine on first use
pub fn model_handle(model: &ModelSection) -> ModelHandle {
    let model = model.clone();
    ModelHandle::new(move || load_engine(&model))
}
