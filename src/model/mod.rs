//! Model module for the CNN architecture using the Burn framework
//!
//! The classifier maps one normalized leaf image to raw logits over the
//! PlantVillage classes. Trained weights are loaded from disk.

pub mod cnn;

// Re-export main types for convenience
pub use cnn::{PlantClassifier, PlantClassifierConfig};
