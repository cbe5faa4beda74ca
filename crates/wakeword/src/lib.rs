//! Wake-word detection core library.
//!
//! This crate provides:
//! - Audio frontend (sample ring buffer + windowed spectral features)
//! - Quantized DS-CNN inference over a fixed tensor arena
//! - Debounced detection policy and the cycle-at-a-time pipeline

pub mod arena;
pub mod audio;
pub mod config;
pub mod constants;
pub mod coop;
pub mod error;
pub mod features;
pub mod model;
pub mod network;
pub mod pipeline;
pub mod policy;
pub mod ring;
pub mod weights;

pub use error::WakeError;
pub use pipeline::{CycleOutcome, WakeWordPipeline};
