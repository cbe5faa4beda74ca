//! Default audio and model constants.
//!
//! These are the documented defaults for `DetectorConfig`; deployed
//! builds override them from configuration, never by editing kernels.

pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// One detection window: 1s @ 16kHz.
pub const WINDOW_SIZE: usize = 16_000;

/// Feature grid fed to the network's first layer.
pub const FEATURE_FRAMES: usize = 65;
pub const FEATURE_COEFFS: usize = 10;

/// Quantization contract shared with the trained model.
pub const FEATURE_SCALE: f32 = 0.1;
pub const FEATURE_ZERO_POINT: i32 = 0;

pub const NUM_CLASSES: usize = 3;

pub const DEFAULT_THRESHOLD: f32 = 0.8;
pub const DEFAULT_COOLDOWN_MS: u64 = 2_000;

/// Voluntary yield granularity inside long loops (elements per tick).
pub const YIELD_GRANULARITY: usize = 128;

/// Largest burst the hardware delivers in one callback, in samples.
/// Ring capacity is one window plus one burst.
pub const MAX_HARDWARE_BURST: usize = 1_600;
