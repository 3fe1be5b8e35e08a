//! Diagnosis records and their assembly from a classification.

use serde::{Deserialize, Serialize};

use crate::inference::classify::ClassifyResult;
use crate::preprocess::BlurAssessment;
use crate::taxonomy::{prettify_label, SpeciesTaxonomy};
use crate::utils::error::{DiagnosisError, Result};

/// Coarse reading of the confidence percentage for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Moderate,
    Low,
}

impl ConfidenceBand {
    /// High from 80%, Moderate from 50%, Low below
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 80.0 {
            ConfidenceBand::High
        } else if percent >= 50.0 {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Low
        }
    }
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceBand::High => write!(f, "High"),
            ConfidenceBand::Moderate => write!(f, "Moderate"),
            ConfidenceBand::Low => write!(f, "Low"),
        }
    }
}

/// Final, immutable result of one diagnosis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub species_key: String,
    pub species_name: String,
    pub class_index: usize,
    pub disease_key: String,
    pub disease_name: String,
    /// Species and disease display names joined, e.g. "Apple Cedar Apple Rust"
    pub common_name: String,
    pub winning_logit: f32,
    pub confidence_percent: f64,
    pub confidence_band: ConfidenceBand,
}

impl DiagnosisResult {
    pub fn is_healthy(&self) -> bool {
        self.disease_key.eq_ignore_ascii_case("healthy")
    }
}

/// What a request produced: a diagnosis, or a blur rejection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DiagnosisOutcome {
    Diagnosed(DiagnosisResult),
    Rejected(BlurAssessment),
}

impl DiagnosisOutcome {
    pub fn diagnosis(&self) -> Option<&DiagnosisResult> {
        match self {
            DiagnosisOutcome::Diagnosed(result) => Some(result),
            DiagnosisOutcome::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, DiagnosisOutcome::Rejected(_))
    }
}

/// Attach species and disease labels to a classification
pub fn assemble(
    taxonomy: &SpeciesTaxonomy,
    species_key: &str,
    result: ClassifyResult,
) -> Result<DiagnosisResult> {
    let species = taxonomy.lookup(species_key)?;
    let disease_key = species.disease_for(result.class_index).ok_or_else(|| {
        DiagnosisError::TaxonomyInconsistency(format!(
            "class {} does not belong to species '{}'",
            result.class_index, species_key
        ))
    })?;

    let species_name = prettify_label(species_key);
    let disease_name = prettify_label(disease_key);

    Ok(DiagnosisResult {
        species_key: species_key.to_string(),
        common_name: format!("{} {}", species_name, disease_name),
        species_name,
        class_index: result.class_index,
        disease_key: disease_key.to_string(),
        disease_name,
        winning_logit: result.logit_value,
        confidence_percent: result.confidence_percent,
        confidence_band: ConfidenceBand::from_percent(result.confidence_percent),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(class_index: usize, confidence_percent: f64) -> ClassifyResult {
        ClassifyResult {
            class_index,
            logit_value: 9.0,
            confidence_percent,
        }
    }

    #[test]
    fn test_assemble_labels() {
        let taxonomy = SpeciesTaxonomy::plantvillage().unwrap();
        let result = assemble(&taxonomy, "Apple", classified(2, 91.5)).unwrap();

        assert_eq!(result.species_name, "Apple");
        assert_eq!(result.disease_key, "Cedar_apple_rust");
        assert_eq!(result.disease_name, "Cedar Apple Rust");
        assert_eq!(result.common_name, "Apple Cedar Apple Rust");
        assert_eq!(result.winning_logit, 9.0);
        assert_eq!(result.confidence_band, ConfidenceBand::High);
        assert!(!result.is_healthy());
    }

    #[test]
    fn test_foreign_class_is_a_taxonomy_bug() {
        let taxonomy = SpeciesTaxonomy::plantvillage().unwrap();
        let err = assemble(&taxonomy, "Apple", classified(4, 10.0)).unwrap_err();
        assert!(matches!(err, DiagnosisError::TaxonomyInconsistency(_)));
    }

    #[test]
    fn test_unknown_species() {
        let taxonomy = SpeciesTaxonomy::plantvillage().unwrap();
        let err = assemble(&taxonomy, "Kiwi", classified(0, 10.0)).unwrap_err();
        assert!(matches!(err, DiagnosisError::UnknownSpecies(_)));
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(ConfidenceBand::from_percent(80.0), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::from_percent(79.99), ConfidenceBand::Moderate);
        assert_eq!(ConfidenceBand::from_percent(50.0), ConfidenceBand::Moderate);
        assert_eq!(ConfidenceBand::from_percent(49.99), ConfidenceBand::Low);
    }

    #[test]
    fn test_outcome_json_shape() {
        let taxonomy = SpeciesTaxonomy::plantvillage().unwrap();
        let diagnosed =
            DiagnosisOutcome::Diagnosed(assemble(&taxonomy, "Tomato", classified(37, 64.2)).unwrap());
        let json = serde_json::to_value(&diagnosed).unwrap();
        assert_eq!(json["status"], "diagnosed");
        assert_eq!(json["diseaseName"], "Healthy");
        assert_eq!(json["confidenceBand"], "moderate");

        let rejected = DiagnosisOutcome::Rejected(BlurAssessment {
            is_blurry: true,
            variance_score: 12.5,
            threshold: 100.0,
        });
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["varianceScore"], 12.5);
        assert!(rejected.is_rejected());
        assert!(rejected.diagnosis().is_none());
    }
}
