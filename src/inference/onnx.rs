//! Classifier engine backed by ONNX Runtime.
//!
//! Holds a small pool of sessions; each forward pass takes the next one
//! round-robin so concurrent passes rarely wait on the same session lock.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};

use crate::inference::engine::{check_input, check_output, ClassifierEngine, LogitVector};
use crate::preprocess::{NormalizedTensor, TENSOR_DIMS};
use crate::utils::error::{DiagnosisError, Result};

pub struct OnnxEngine {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: String,
    input_dims: [usize; 3],
    num_classes: usize,
}

impl OnnxEngine {
    /// Open `pool_size` sessions on the model file (at least one)
    pub fn load(path: &Path, num_classes: usize, pool_size: usize) -> Result<Self> {
        let model_load_error = |e: ort::Error| DiagnosisError::ModelLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if !path.exists() {
            return Err(DiagnosisError::ModelLoad {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        let mut sessions = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let session = Session::builder()
                .and_then(|b| b.with_log_level(LogLevel::Error))
                .and_then(|b| b.commit_from_file(path))
                .map_err(model_load_error)?;
            sessions.push(session);
        }

        let first = &sessions[0];
        let input = first
            .inputs
            .first()
            .ok_or_else(|| DiagnosisError::ModelLoad {
                path: path.to_path_buf(),
                reason: "model declares no inputs".to_string(),
            })?;
        let input_name = input.name.clone();
        let input_dims = match &input.input_type {
            ValueType::Tensor { shape, .. } => {
                let shape: Vec<i64> = shape.iter().copied().collect();
                declared_input_dims(&shape).map_err(|reason| DiagnosisError::ModelLoad {
                    path: path.to_path_buf(),
                    reason,
                })?
            }
            _ => {
                return Err(DiagnosisError::ModelLoad {
                    path: path.to_path_buf(),
                    reason: format!("input '{}' is not a tensor", input_name),
                })
            }
        };
        let output_name = first
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| DiagnosisError::ModelLoad {
                path: path.to_path_buf(),
                reason: "model declares no outputs".to_string(),
            })?;

        tracing::info!(
            path = %path.display(),
            sessions = sessions.len(),
            input = %input_name,
            input_dims = ?input_dims,
            output = %output_name,
            "loaded ONNX classifier"
        );

        Ok(Self {
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next_idx: AtomicUsize::new(0),
            input_name,
            output_name,
            input_dims,
            num_classes,
        })
    }
}

/// Per-image [C, H, W] from the declared input shape.
///
/// Takes the trailing three dimensions of a rank 3 or 4 shape; a dynamic
/// dimension (negative) falls back to the standard 3x256x256 layout.
fn declared_input_dims(shape: &[i64]) -> std::result::Result<[usize; 3], String> {
    if !(3..=4).contains(&shape.len()) {
        return Err(format!(
            "input has rank {} ({:?}), expected [N, C, H, W]",
            shape.len(),
            shape
        ));
    }

    let trailing = &shape[shape.len() - 3..];
    let mut dims = TENSOR_DIMS;
    for (dim, &declared) in dims.iter_mut().zip(trailing) {
        if declared > 0 {
            *dim = declared as usize;
        }
    }
    Ok(dims)
}

impl ClassifierEngine for OnnxEngine {
    fn name(&self) -> &str {
        "onnx"
    }

    fn input_dims(&self) -> [usize; 3] {
        self.input_dims
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn forward(&self, input: &NormalizedTensor) -> Result<LogitVector> {
        check_input(self, input)?;

        let dims: Vec<i64> = input.batch_shape().iter().map(|&d| d as i64).collect();
        let tensor = TensorRef::from_array_view((dims, input.data()))
            .map_err(|e| DiagnosisError::Inference(format!("building input tensor: {}", e)))?;
        let inputs = ort::inputs![self.input_name.as_str() => tensor];

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx].lock().map_err(|_| {
            DiagnosisError::Inference(format!(
                "session {}/{} lock poisoned",
                idx,
                self.sessions.len()
            ))
        })?;

        let outputs = session
            .run(inputs)
            .map_err(|e| DiagnosisError::Inference(format!("forward pass: {}", e)))?;

        let (_, logits) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                DiagnosisError::Inference(format!(
                    "extracting '{}' as f32: {}",
                    self.output_name, e
                ))
            })?;
        let logits = logits.to_vec();

        check_output(self, &logits)?;
        Ok(logits)
    }
}
