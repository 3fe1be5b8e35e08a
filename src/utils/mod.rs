//! Utilities module for logging and error handling
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{DiagnosisError, FaultKind, Result, ResultExt};
pub use logging::{init_logging, LogConfig, LogLevel, StageTimer};

/// Round to two decimal places, the precision reported to callers
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(99.994), 99.99);
        assert_eq!(round2(0.0), 0.0);
    }
}
