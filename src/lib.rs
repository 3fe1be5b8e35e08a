//! # Leaf Diagnosis
//!
//! Plant leaf disease diagnosis from a single photograph and a known crop
//! species, built on the Burn framework.
//!
//! ## Features
//!
//! - **Sharpness gate** rejects out-of-focus photos before any model work
//! - **Test-time augmentation**: identity, mirror and 90° views, raw logits averaged
//! - **Species-constrained classification**: one global 38-class PlantVillage
//!   classifier masked down to the requested species' classes
//! - **Masked-softmax confidence** normalized over that species only
//! - **Lazy model loading** shared across requests
//!
//! ## Modules
//!
//! - `preprocess`: decoding, normalization, sharpness gate, TTA variants
//! - `model`: CNN architecture built with Burn
//! - `inference`: engines, ensemble, classification and the `Diagnoser` pipeline
//! - `taxonomy`: species → disease → class-index mapping
//! - `diagnosis`: result records and assembly
//! - `config`: TOML configuration
//! - `utils`: logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leaf_diagnosis::{Diagnoser, DiagnosisConfig, DiagnosisOutcome};
//!
//! let diagnoser = Diagnoser::from_config(&DiagnosisConfig::default())?;
//! let bytes = std::fs::read("leaf.jpg")?;
//! match diagnoser.diagnose(&bytes, "Tomato")? {
//!     DiagnosisOutcome::Diagnosed(result) => println!("{}", result.common_name),
//!     DiagnosisOutcome::Rejected(blur) => println!("blurry: {}", blur.variance_score),
//! }
//! ```

pub mod backend;
pub mod config;
pub mod diagnosis;
pub mod inference;
pub mod model;
pub mod preprocess;
pub mod taxonomy;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{DiagnosisConfig, EngineBackend};
pub use diagnosis::{assemble, ConfidenceBand, DiagnosisOutcome, DiagnosisResult};
pub use inference::{
    classify, ensemble_forward, ClassifierEngine, ClassifyResult, Diagnoser, LogitVector,
    ModelHandle, PassMode,
};
pub use preprocess::{
    assess_blur, generate_variants, normalize, BlurAssessment, NormalizedTensor, RawImage,
};
pub use taxonomy::{prettify_label, SpeciesClassMap, SpeciesTaxonomy, NUM_CLASSES};
pub use utils::error::{DiagnosisError, FaultKind, Result};

/// Side length of the square model input
pub const IMAGE_SIZE: usize = 256;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
