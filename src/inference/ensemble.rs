//! Test-time-augmentation ensemble: run every variant, average raw logits.

use rayon::prelude::*;

use crate::inference::engine::{ClassifierEngine, LogitVector};
use crate::preprocess::NormalizedTensor;
use crate::utils::error::{DiagnosisError, Result};

/// Run the engine on every variant in parallel and average the logits.
///
/// All passes are awaited before anything is returned; if any pass fails the
/// whole ensemble fails with that error.
pub fn ensemble_forward(
    engine: &dyn ClassifierEngine,
    variants: &[NormalizedTensor],
) -> Result<LogitVector> {
    let outputs: Vec<LogitVector> = variants
        .par_iter()
        .map(|variant| engine.forward(variant))
        .collect::<Result<_>>()?;

    tracing::debug!(passes = outputs.len(), engine = engine.name(), "ensemble complete");
    average_logits(&outputs)
}

/// Element-wise arithmetic mean of equal-length logit vectors.
///
/// Accumulates in f64 and divides once, so averaging identical vectors
/// returns them unchanged.
pub fn average_logits(outputs: &[LogitVector]) -> Result<LogitVector> {
    let first = outputs
        .first()
        .ok_or_else(|| DiagnosisError::Inference("no logit vectors to average".to_string()))?;
    let len = first.len();

    if let Some(bad) = outputs.iter().find(|o| o.len() != len) {
        return Err(DiagnosisError::Inference(format!(
            "logit vectors differ in length: {} vs {}",
            len,
            bad.len()
        )));
    }

    let count = outputs.len() as f64;
    let mut sums = vec![0.0f64; len];
    for output in outputs {
        for (sum, &value) in sums.iter_mut().zip(output) {
            *sum += value as f64;
        }
    }

    Ok(sums.into_iter().map(|s| (s / count) as f32).collect())
}
