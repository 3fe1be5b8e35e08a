//! Species-constrained classification.
//!
//! One global classifier serves every crop: logits outside the species'
//! valid classes are masked to negative infinity, then argmax and softmax
//! run over the masked vector.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::taxonomy::SpeciesClassMap;
use crate::utils::error::{DiagnosisError, Result};
use crate::utils::round2;

/// Winning class for one species
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResult {
    pub class_index: usize,
    /// Raw (averaged) logit of the winning class
    pub logit_value: f32,
    /// Masked-softmax probability of the winner, in percent, two decimals
    pub confidence_percent: f64,
}

/// Copy `logits` with every index outside `valid_indices` set to `-inf`
pub fn mask_logits(logits: &[f32], valid_indices: &BTreeSet<usize>) -> Result<Vec<f32>> {
    if let Some(&out_of_range) = valid_indices.iter().find(|&&i| i >= logits.len()) {
        return Err(DiagnosisError::TaxonomyInconsistency(format!(
            "valid class {} is outside the model's {} outputs",
            out_of_range,
            logits.len()
        )));
    }

    Ok(logits
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if valid_indices.contains(&i) {
                v
            } else {
                f32::NEG_INFINITY
            }
        })
        .collect())
}

/// Index of the first strict maximum, scanning in ascending order.
///
/// Returns `None` when no value beats `-inf`.
pub fn masked_argmax(masked: &[f32]) -> Option<usize> {
    let mut best = None;
    let mut best_value = f32::NEG_INFINITY;

    for (i, &value) in masked.iter().enumerate() {
        if value > best_value {
            best_value = value;
            best = Some(i);
        }
    }

    best
}

/// Numerically stable softmax over a masked vector; `-inf` entries get 0
pub fn masked_softmax(masked: &[f32]) -> Vec<f64> {
    let max = masked
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max) as f64;
    if !max.is_finite() {
        return vec![0.0; masked.len()];
    }

    let exps: Vec<f64> = masked.iter().map(|&v| (v as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// A valid logit may be any finite value or `-inf`; NaN and `+inf` have no
/// meaningful softmax share
fn check_valid_logits(logits: &[f32], valid_indices: &BTreeSet<usize>) -> Result<()> {
    match valid_indices
        .iter()
        .find(|&&i| logits[i].is_nan() || logits[i] == f32::INFINITY)
    {
        Some(&i) => Err(DiagnosisError::Inference(format!(
            "logit {} is {}",
            i, logits[i]
        ))),
        None => Ok(()),
    }
}

/// Pick the best valid class and its masked-softmax confidence
pub fn classify(logits: &[f32], valid_indices: &BTreeSet<usize>) -> Result<ClassifyResult> {
    if valid_indices.is_empty() {
        return Err(DiagnosisError::EmptyValidSet(
            "valid index set is empty".to_string(),
        ));
    }

    let masked = mask_logits(logits, valid_indices)?;
    check_valid_logits(logits, valid_indices)?;
    let class_index = masked_argmax(&masked).ok_or_else(|| {
        DiagnosisError::Inference("no valid class has a finite logit".to_string())
    })?;
    let probabilities = masked_softmax(&masked);

    Ok(ClassifyResult {
        class_index,
        logit_value: logits[class_index],
        confidence_percent: round2(probabilities[class_index] * 100.0),
    })
}

/// Classify for a species, naming it in the error if it owns no classes
pub fn classify_species(logits: &[f32], species: &SpeciesClassMap) -> Result<ClassifyResult> {
    if species.is_empty() {
        return Err(DiagnosisError::EmptyValidSet(species.key().to_string()));
    }
    classify(logits, &species.valid_indices())
}

/// Masked-softmax percentage for every valid class, in class-index order
pub fn species_probabilities(
    logits: &[f32],
    valid_indices: &BTreeSet<usize>,
) -> Result<Vec<(usize, f64)>> {
    let masked = mask_logits(logits, valid_indices)?;
    check_valid_logits(logits, valid_indices)?;
    let probabilities = masked_softmax(&masked);
    Ok(valid_indices
        .iter()
        .map(|&i| (i, round2(probabilities[i] * 100.0)))
        .collect())
}
