//! Detector configuration (`config.json`) parsing.
//!
//! Every tunable the deployment contract names is enumerated here;
//! kernels and layers read their dimensions from this surface and the
//! topology, never from hard-coded literals.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COOLDOWN_MS, DEFAULT_THRESHOLD, FEATURE_COEFFS, FEATURE_FRAMES, FEATURE_SCALE,
    FEATURE_ZERO_POINT, MAX_HARDWARE_BURST, SAMPLE_RATE_HZ, WINDOW_SIZE,
};

/// Affine mapping between real values and their int8 representation:
/// `real = scale * (quantized - zero_point)`.
///
/// Must equal the pair used when quantizing training data; it is a
/// deployment contract, not a per-build choice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureShape {
    pub frames: usize,
    pub coeffs: usize,
}

impl FeatureShape {
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames * self.coeffs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One network output class. Non-actionable classes (silence, unknown)
/// never fire a detection regardless of confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    pub actionable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub sample_rate_hz: u32,
    pub window_size: usize,
    pub feature: FeatureShape,
    pub quant: QuantParams,
    pub arena_bytes: usize,
    pub threshold: f32,
    pub cooldown_ms: u64,
    /// Index-aligned with the network's output vector.
    pub classes: Vec<ClassSpec>,
    #[serde(default = "default_burst")]
    pub max_hardware_burst: usize,
}

fn default_burst() -> usize {
    MAX_HARDWARE_BURST
}

impl DetectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("parse detector config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let json = std::fs::read_to_string(path_ref)
            .with_context(|| format!("read {}", path_ref.display()))?;
        Self::from_json_str(&json)
    }

    /// Ring capacity: one full window plus the largest hardware burst.
    #[must_use]
    pub fn ring_capacity(&self) -> usize {
        self.window_size + self.max_hardware_burst
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.sample_rate_hz > 0, "sample_rate_hz must be > 0");
        anyhow::ensure!(
            self.window_size >= 2 && self.window_size % 2 == 0,
            "window_size must be even and >= 2"
        );
        anyhow::ensure!(
            self.feature.frames > 0 && self.feature.coeffs > 0,
            "feature shape must be non-empty"
        );
        anyhow::ensure!(
            self.quant.scale.is_finite() && self.quant.scale > 0.0,
            "quant scale must be finite and > 0"
        );
        anyhow::ensure!(self.arena_bytes > 0, "arena_bytes must be > 0");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.threshold),
            "threshold must be within 0.0..=1.0"
        );
        anyhow::ensure!(!self.classes.is_empty(), "class table must be non-empty");
        anyhow::ensure!(
            self.classes.iter().any(|c| c.actionable),
            "at least one class must be actionable"
        );
        anyhow::ensure!(
            self.max_hardware_burst > 0,
            "max_hardware_burst must be > 0"
        );
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            window_size: WINDOW_SIZE,
            feature: FeatureShape {
                frames: FEATURE_FRAMES,
                coeffs: FEATURE_COEFFS,
            },
            quant: QuantParams {
                scale: FEATURE_SCALE,
                zero_point: FEATURE_ZERO_POINT,
            },
            // Enough for the default topology; initialize() verifies.
            arena_bytes: 64 * 1024,
            threshold: DEFAULT_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            classes: vec![
                ClassSpec {
                    name: "marvin".to_string(),
                    actionable: true,
                },
                ClassSpec {
                    name: "unknown".to_string(),
                    actionable: false,
                },
                ClassSpec {
                    name: "silence".to_string(),
                    actionable: false,
                },
            ],
            max_hardware_burst: MAX_HARDWARE_BURST,
        }
    }
}
