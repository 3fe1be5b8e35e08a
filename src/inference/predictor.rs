//! Diagnosis pipeline.
//!
//! [`Diagnoser`] ties the stages together for one request:
//! species lookup, decode, sharpness gate, variants, model, ensemble,
//! masked classification and assembly. Nothing is shared between requests
//! except the model handle and the taxonomy, both read-only once built.

use std::sync::Arc;

use crate::config::DiagnosisConfig;
use crate::diagnosis::{assemble, DiagnosisOutcome};
use crate::inference::classify::classify_species;
use crate::inference::engine::{ClassifierEngine, LogitVector, ModelHandle};
use crate::inference::ensemble::ensemble_forward;
use crate::inference::model_handle;
use crate::preprocess::{
    generate_variants_raw, normalize_raw, BlurAssessment, RawImage, SharpnessGate,
};
use crate::taxonomy::SpeciesTaxonomy;
use crate::utils::error::{DiagnosisError, Result};
use crate::utils::logging::StageTimer;

/// How many forward passes a diagnosis uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Identity, mirror and rotation, logits averaged
    Ensemble,
    /// One forward pass on the normalized image
    Single,
}

/// End-to-end plant disease diagnoser; clones share the model and taxonomy
#[derive(Debug, Clone)]
pub struct Diagnoser {
    model: Arc<ModelHandle>,
    taxonomy: Arc<SpeciesTaxonomy>,
    gate: SharpnessGate,
    mode: PassMode,
}

impl Diagnoser {
    /// Create a diagnoser with the default blur threshold and TTA enabled
    pub fn new(model: ModelHandle, taxonomy: SpeciesTaxonomy) -> Self {
        Self {
            model: Arc::new(model),
            taxonomy: Arc::new(taxonomy),
            gate: SharpnessGate::default(),
            mode: PassMode::Ensemble,
        }
    }

    /// Build from configuration. The taxonomy is loaded now; the model on first use.
    pub fn from_config(config: &DiagnosisConfig) -> Result<Self> {
        config.validate()?;

        let taxonomy = match &config.taxonomy.path {
            Some(path) => SpeciesTaxonomy::from_json_file(path, config.model.num_classes)?,
            None => SpeciesTaxonomy::plantvillage()?,
        };
        if taxonomy.num_classes() != config.model.num_classes {
            return Err(DiagnosisError::TaxonomyInconsistency(format!(
                "taxonomy covers {} classes, model.num_classes is {}",
                taxonomy.num_classes(),
                config.model.num_classes
            )));
        }

        let mode = if config.inference.tta {
            PassMode::Ensemble
        } else {
            PassMode::Single
        };

        Ok(Self::new(model_handle(&config.model), taxonomy)
            .with_blur_threshold(config.blur.threshold)
            .with_mode(mode))
    }

    pub fn with_blur_threshold(mut self, threshold: f64) -> Self {
        self.gate = SharpnessGate::new(threshold);
        self
    }

    pub fn with_mode(mut self, mode: PassMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn taxonomy(&self) -> &SpeciesTaxonomy {
        &self.taxonomy
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn mode(&self) -> PassMode {
        self.mode
    }

    /// Focus check only; never touches the model
    pub fn assess_blur(&self, image_bytes: &[u8]) -> Result<BlurAssessment> {
        self.gate
            .assess_bytes(image_bytes)
            .inspect_err(DiagnosisError::log)
    }

    /// Diagnose with the configured pass mode
    pub fn diagnose(&self, image_bytes: &[u8], species_key: &str) -> Result<DiagnosisOutcome> {
        self.run(image_bytes, species_key, self.mode)
    }

    /// Diagnose with one forward pass, regardless of configuration
    pub fn diagnose_single(
        &self,
        image_bytes: &[u8],
        species_key: &str,
    ) -> Result<DiagnosisOutcome> {
        self.run(image_bytes, species_key, PassMode::Single)
    }

    fn run(
        &self,
        image_bytes: &[u8],
        species_key: &str,
        mode: PassMode,
    ) -> Result<DiagnosisOutcome> {
        self.pipeline(image_bytes, species_key, mode)
            .inspect_err(DiagnosisError::log)
    }

    fn pipeline(
        &self,
        image_bytes: &[u8],
        species_key: &str,
        mode: PassMode,
    ) -> Result<DiagnosisOutcome> {
        let total = StageTimer::start("diagnose");
        let species = self.taxonomy.lookup(species_key)?;

        let timer = StageTimer::start("decode");
        let raw = RawImage::decode(image_bytes)?;
        timer.finish();

        let timer = StageTimer::start("blur_gate");
        let blur = self.gate.assess(&raw);
        timer.finish();
        if blur.is_blurry {
            tracing::warn!(
                species = species_key,
                variance = blur.variance_score,
                threshold = blur.threshold,
                "image rejected as blurry"
            );
            return Ok(DiagnosisOutcome::Rejected(blur));
        }

        let timer = StageTimer::start("preprocess");
        let inputs = match mode {
            PassMode::Ensemble => Vec::from(generate_variants_raw(&raw)?),
            PassMode::Single => vec![normalize_raw(&raw)?],
        };
        drop(raw);
        timer.finish();

        let engine = self.model.get()?;
        self.check_output_space(engine.as_ref())?;

        let timer = StageTimer::start("inference");
        let logits: LogitVector = match mode {
            PassMode::Ensemble => ensemble_forward(engine.as_ref(), &inputs)?,
            PassMode::Single => engine.forward(&inputs[0])?,
        };
        timer.finish();

        let classified = classify_species(&logits, species)?;
        let result = assemble(&self.taxonomy, species_key, classified)?;

        tracing::info!(
            species = species_key,
            disease = %result.disease_key,
            class_index = result.class_index,
            confidence = result.confidence_percent,
            passes = inputs.len(),
            elapsed_ms = total.elapsed_ms(),
            "diagnosis complete"
        );

        Ok(DiagnosisOutcome::Diagnosed(result))
    }

    fn check_output_space(&self, engine: &dyn ClassifierEngine) -> Result<()> {
        if engine.num_classes() != self.taxonomy.num_classes() {
            return Err(DiagnosisError::TaxonomyInconsistency(format!(
                "{} model emits {} classes, taxonomy covers {}",
                engine.name(),
                engine.num_classes(),
                self.taxonomy.num_classes()
            )));
        }
        Ok(())
    }
}
