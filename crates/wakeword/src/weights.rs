//! Safetensors-backed model weight loading.
//!
//! The converter emits one `layers.N.weight` (int8) and `layers.N.bias`
//! (int32) pair per parametric layer, with N counting parametric layers
//! in declaration order.

use std::path::Path;

use memmap2::MmapOptions;
use safetensors::tensor::{Dtype, SafeTensorError};
use thiserror::Error;

use crate::network::{LayerParams, ModelWeights, NetworkTopology};

#[derive(Debug)]
pub struct WeightStore {
    mmap: memmap2::Mmap,
}

#[derive(Debug, Error)]
pub enum WeightError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("safetensors error: {0}")]
    SafeTensors(#[from] SafeTensorError),
    #[error("unsupported dtype for {name}: {dtype:?}")]
    UnsupportedDtype { name: String, dtype: Dtype },
    #[error("invalid tensor byte length for {name}: got {bytes}, expected multiple of {elem_size}")]
    InvalidByteLen {
        name: String,
        bytes: usize,
        elem_size: usize,
    },
}

impl WeightStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WeightError> {
        let file = std::fs::File::open(path)?;
        // SAFETY: read-only file mapping for immutable tensor access.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self { mmap })
    }

    pub fn names(&self) -> Result<Vec<String>, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        Ok(st.iter().map(|(name, _)| name.to_string()).collect())
    }

    pub fn tensor_i8(&self, name: &str) -> Result<Vec<i8>, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        let tv = st.tensor(name)?;
        match tv.dtype() {
            Dtype::I8 => Ok(tv.data().iter().map(|&b| b as i8).collect()),
            other => Err(WeightError::UnsupportedDtype {
                name: name.to_string(),
                dtype: other,
            }),
        }
    }

    pub fn tensor_i32(&self, name: &str) -> Result<Vec<i32>, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        let tv = st.tensor(name)?;
        match tv.dtype() {
            Dtype::I32 => {
                let raw = tv.data();
                if raw.len() % 4 != 0 {
                    return Err(WeightError::InvalidByteLen {
                        name: name.to_string(),
                        bytes: raw.len(),
                        elem_size: 4,
                    });
                }
                Ok(raw
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect())
            }
            other => Err(WeightError::UnsupportedDtype {
                name: name.to_string(),
                dtype: other,
            }),
        }
    }

    /// Pull every parametric layer of `topology` out of the store.
    /// Length validation happens later when the network binds them.
    pub fn load_model(&self, topology: &NetworkTopology) -> Result<ModelWeights, WeightError> {
        let parametric = topology
            .layers
            .iter()
            .filter(|l| !matches!(l, crate::network::LayerSpec::GlobalAvgPool))
            .count();
        let mut layers = Vec::with_capacity(parametric);
        for i in 0..parametric {
            layers.push(LayerParams {
                weights: self.tensor_i8(&format!("layers.{i}.weight"))?,
                bias: self.tensor_i32(&format!("layers.{i}.bias"))?,
            });
        }
        Ok(ModelWeights { layers })
    }
}
