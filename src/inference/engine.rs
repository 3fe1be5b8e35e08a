//! Classifier engine abstraction and the lazily-initialized model handle.
//!
//! Every backend (Burn checkpoint, ONNX Runtime, scripted test doubles)
//! implements [`ClassifierEngine`]. The pipeline never constructs an engine
//! directly: it asks a [`ModelHandle`], which loads on first use and hands the
//! same shared instance to all later callers.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::preprocess::NormalizedTensor;
use crate::utils::error::{DiagnosisError, Result};
use crate::utils::logging::StageTimer;

/// Raw, unnormalized class scores; index i belongs to class i
pub type LogitVector = Vec<f32>;

/// A loaded image classifier: one normalized tensor in, one logit vector out
pub trait ClassifierEngine: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Expected [channels, height, width] of the input
    fn input_dims(&self) -> [usize; 3];

    /// Length of the logit vector
    fn num_classes(&self) -> usize;

    /// Run one forward pass
    fn forward(&self, input: &NormalizedTensor) -> Result<LogitVector>;
}

/// Reject an input whose shape differs from what the engine expects
pub fn check_input(engine: &dyn ClassifierEngine, input: &NormalizedTensor) -> Result<()> {
    if input.dims() != engine.input_dims() {
        return Err(DiagnosisError::Inference(format!(
            "{} expects input {:?}, got {:?}",
            engine.name(),
            engine.input_dims(),
            input.dims()
        )));
    }
    Ok(())
}

/// Reject an output whose length differs from the engine's class count
pub fn check_output(engine: &dyn ClassifierEngine, logits: &[f32]) -> Result<()> {
    if logits.len() != engine.num_classes() {
        return Err(DiagnosisError::Inference(format!(
            "{} produced {} logits, expected {}",
            engine.name(),
            logits.len(),
            engine.num_classes()
        )));
    }
    Ok(())
}

type EngineLoader = Box<dyn Fn() -> Result<Arc<dyn ClassifierEngine>> + Send + Sync>;

/// Lazily-initialized, process-wide classifier.
///
/// The first successful [`get`](ModelHandle::get) runs the loader; concurrent
/// first callers wait for that single load. A failed load is not cached, so
/// the next call retries.
pub struct ModelHandle {
    engine: OnceLock<Arc<dyn ClassifierEngine>>,
    init_lock: Mutex<()>,
    loader: EngineLoader,
    load_attempts: AtomicUsize,
}

impl ModelHandle {
    /// Create a handle that will call `loader` on first use
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ClassifierEngine>> + Send + Sync + 'static,
    {
        Self {
            engine: OnceLock::new(),
            init_lock: Mutex::new(()),
            loader: Box::new(loader),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Create a handle around an engine that is already loaded
    pub fn from_engine(engine: Arc<dyn ClassifierEngine>) -> Self {
        let handle = Self::new(|| {
            Err(DiagnosisError::Inference(
                "preloaded model handle has no loader".to_string(),
            ))
        });
        // Freshly created, so the cell is empty
        let _ = handle.engine.set(engine);
        handle
    }

    /// Get the shared engine, loading it if this is the first call
    pub fn get(&self) -> Result<Arc<dyn ClassifierEngine>> {
        if let Some(engine) = self.engine.get() {
            return Ok(Arc::clone(engine));
        }

        // A poisoned lock only means another loader panicked; the cell is still consistent
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(engine) = self.engine.get() {
            return Ok(Arc::clone(engine));
        }

        self.load_attempts.fetch_add(1, Ordering::Relaxed);
        let timer = StageTimer::start("model_load");
        let engine = (self.loader)().inspect_err(|e| {
            tracing::error!(error = %e, "model load failed");
        })?;
        let elapsed_ms = timer.finish();

        tracing::info!(
            engine = engine.name(),
            num_classes = engine.num_classes(),
            elapsed_ms,
            "classifier loaded"
        );

        let _ = self.engine.set(Arc::clone(&engine));
        Ok(engine)
    }

    /// Whether the engine has been loaded
    pub fn is_loaded(&self) -> bool {
        self.engine.get().is_some()
    }

    /// How many times the loader has run (successful or not)
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("loaded", &self.is_loaded())
            .field("load_attempts", &self.load_attempts())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_engines::FixedEngine;
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn fixed(n: usize) -> Arc<dyn ClassifierEngine> {
        Arc::new(FixedEngine {
            logits: vec![0.5; n],
        })
    }

    #[test]
    fn test_loads_once() {
        let handle = ModelHandle::new(|| Ok(fixed(4)));
        assert!(!handle.is_loaded());

        let first = handle.get().unwrap();
        let second = handle.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(handle.load_attempts(), 1);
        assert!(handle.is_loaded());
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let handle = ModelHandle::new(|| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(fixed(4))
        });

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    assert_eq!(handle.get().unwrap().num_classes(), 4);
                });
            }
        });

        assert_eq!(handle.load_attempts(), 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let fail_next = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&fail_next);
        let handle = ModelHandle::new(move || {
            if flag.swap(false, Ordering::SeqCst) {
                Err(DiagnosisError::ModelLoad {
                    path: "missing.mpk".into(),
                    reason: "file not found".to_string(),
                })
            } else {
                Ok(fixed(2))
            }
        });

        assert!(matches!(handle.get(), Err(DiagnosisError::ModelLoad { .. })));
        assert!(!handle.is_loaded());
        assert!(handle.get().is_ok());
        assert_eq!(handle.load_attempts(), 2);
    }

    #[test]
    fn test_preloaded_handle() {
        let handle = ModelHandle::from_engine(fixed(3));
        assert!(handle.is_loaded());
        assert_eq!(handle.get().unwrap().num_classes(), 3);
        assert_eq!(handle.load_attempts(), 0);
    }

    #[test]
    fn test_shape_checks() {
        let engine = FixedEngine {
            logits: vec![0.0; 3],
        };
        let wrong = NormalizedTensor::from_raw([3, 2, 2], vec![0.0; 12]).unwrap();
        assert!(matches!(
            engine.forward(&wrong),
            Err(DiagnosisError::Inference(_))
        ));
        assert!(check_output(&engine, &[1.0, 2.0]).is_err());
        assert!(check_output(&engine, &[1.0, 2.0, 3.0]).is_ok());
    }
}
