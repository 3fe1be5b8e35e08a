//! Classifier engine backed by the Burn `PlantClassifier`.

use std::path::Path;
use std::sync::Mutex;

use burn::tensor::{Tensor, TensorData};

use crate::backend::{backend_name, default_device, InferenceBackend, InferenceDevice};
use crate::inference::engine::{check_input, check_output, ClassifierEngine, LogitVector};
use crate::model::{PlantClassifier, PlantClassifierConfig};
use crate::preprocess::NormalizedTensor;
use crate::utils::error::{DiagnosisError, Result};

/// Runs a trained `PlantClassifier` on the compiled-in Burn backend.
///
/// Burn modules are `Send` but not `Sync`; the model sits behind a mutex and
/// each forward pass works on a cheap clone so passes run concurrently.
pub struct BurnEngine {
    model: Mutex<PlantClassifier<InferenceBackend>>,
    config: PlantClassifierConfig,
    device: InferenceDevice,
}

impl BurnEngine {
    pub fn new(
        model: PlantClassifier<InferenceBackend>,
        config: PlantClassifierConfig,
        device: InferenceDevice,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            config,
            device,
        }
    }

    /// Load a CompactRecorder checkpoint onto the default device
    pub fn load(path: &Path, config: PlantClassifierConfig) -> Result<Self> {
        let device = default_device();
        tracing::info!(
            path = %path.display(),
            backend = backend_name(),
            num_classes = config.num_classes,
            "loading Burn classifier"
        );
        let model = PlantClassifier::load(&config, path, &device)?;
        Ok(Self::new(model, config, device))
    }
}

impl ClassifierEngine for BurnEngine {
    fn name(&self) -> &str {
        "burn"
    }

    fn input_dims(&self) -> [usize; 3] {
        self.config.input_dims()
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn forward(&self, input: &NormalizedTensor) -> Result<LogitVector> {
        check_input(self, input)?;

        let model = self
            .model
            .lock()
            .map_err(|_| DiagnosisError::Inference("model lock poisoned".to_string()))?
            .clone();

        let data = TensorData::new(input.data().to_vec(), input.batch_shape());
        let x = Tensor::<InferenceBackend, 4>::from_data(data, &self.device);

        let logits: Vec<f32> = model
            .forward(x)
            .into_data()
            .to_vec()
            .map_err(|e| DiagnosisError::Inference(format!("reading logits: {:?}", e)))?;

        check_output(self, &logits)?;
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_engine() -> BurnEngine {
        let config = PlantClassifierConfig::new()
            .with_input_size(32)
            .with_base_filters(4);
        let device = default_device();
        let model = PlantClassifier::new(&config, &device);
        BurnEngine::new(model, config, device)
    }

    #[test]
    fn test_forward_produces_one_logit_per_class() {
        let engine = small_engine();
        let input = NormalizedTensor::from_raw([3, 32, 32], vec![0.1; 3 * 32 * 32]).unwrap();
        let logits = engine.forward(&input).unwrap();
        assert_eq!(logits.len(), 38);
        assert!(logits.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let engine = small_engine();
        let input = NormalizedTensor::from_raw([3, 32, 32], vec![-0.4; 3 * 32 * 32]).unwrap();
        assert_eq!(engine.forward(&input).unwrap(), engine.forward(&input).unwrap());
    }

    #[test]
    fn test_wrong_input_shape() {
        let engine = small_engine();
        let input = NormalizedTensor::from_raw([3, 16, 16], vec![0.0; 3 * 16 * 16]).unwrap();
        assert!(matches!(
            engine.forward(&input),
            Err(DiagnosisError::Inference(_))
        ));
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let result = BurnEngine::load(
            Path::new("/nonexistent/plant_classifier.mpk"),
            PlantClassifierConfig::new(),
        );
        assert!(matches!(result, Err(DiagnosisError::ModelLoad { .. })));
    }
}
