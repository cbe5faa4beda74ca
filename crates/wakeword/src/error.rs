//! Error taxonomy for the detection pipeline.
//!
//! Configuration errors (`ArenaTooSmall`, `ShapeMismatch`,
//! `AccumulatorOverflowRisk`) are raised at initialization only; a
//! pipeline that initialized successfully never reports them at
//! steady state.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WakeError {
    /// Transient: the hardware read did not fill a window in time.
    /// The pipeline absorbs this and skips the cycle.
    #[error("hardware read timed out before delivering a full buffer")]
    HardwareReadTimeout,

    #[error("arena too small: need {required} bytes, have {available}")]
    ArenaTooSmall { required: usize, available: usize },

    #[error("shape mismatch at {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("run_cycle called before initialize succeeded")]
    NotInitialized,

    #[error(
        "layer {layer} could overflow the i32 accumulator (worst case {worst_case})"
    )]
    AccumulatorOverflowRisk { layer: usize, worst_case: i64 },

    /// The spectral transform primitive failed; no feature matrix was
    /// emitted for this window.
    #[error("spectral transform failed: {0}")]
    SpectrumFailure(&'static str),
}
