//! High-level model asset loading from a model directory.
//!
//! A model directory holds `config.json` (detector configuration) and
//! `model.safetensors` (quantized layer weights).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::DetectorConfig;
use crate::network::{ModelWeights, NetworkTopology};
use crate::weights::WeightStore;

#[derive(Debug)]
pub struct ModelBundle {
    pub config: DetectorConfig,
    pub weights: ModelWeights,
}

fn config_path(dir: &Path) -> PathBuf {
    dir.join("config.json")
}

fn weights_path(dir: &Path) -> PathBuf {
    dir.join("model.safetensors")
}

impl ModelBundle {
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config = DetectorConfig::from_path(config_path(dir)).context("load config.json")?;
        let topology = NetworkTopology::dscnn(
            config.feature.frames,
            config.feature.coeffs,
            config.classes.len(),
        );
        let store =
            WeightStore::open(weights_path(dir)).context("load model.safetensors")?;
        let weights = store
            .load_model(&topology)
            .context("read layer tensors")?;
        Ok(Self { config, weights })
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use safetensors::tensor::{Dtype, View, serialize_to_file};

    use super::ModelBundle;
    use crate::config::DetectorConfig;
    use crate::network::{ModelWeights, NetworkTopology};

    #[derive(Debug, Clone)]
    struct TestTensor {
        dtype: Dtype,
        shape: Vec<usize>,
        data: Vec<u8>,
    }

    impl View for TestTensor {
        fn dtype(&self) -> Dtype {
            self.dtype
        }
        fn shape(&self) -> &[usize] {
            &self.shape
        }
        fn data(&self) -> Cow<'_, [u8]> {
            Cow::Borrowed(&self.data)
        }
        fn data_len(&self) -> usize {
            self.data.len()
        }
    }

    fn tmp_dir(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("wakeword-model-test-{name}-{nanos}"));
        std::fs::create_dir_all(&p).expect("create dir");
        p
    }

    #[test]
    fn loads_config_and_weights_from_directory() {
        let dir = tmp_dir("bundle");

        let config = DetectorConfig::default();
        std::fs::write(
            dir.join("config.json"),
            serde_json::to_string(&config).expect("serialize config"),
        )
        .expect("write config");

        let topology = NetworkTopology::dscnn(
            config.feature.frames,
            config.feature.coeffs,
            config.classes.len(),
        );
        let zeroed = ModelWeights::zeroed(&topology).expect("zeroed");
        let mut tensors = Vec::new();
        for (i, layer) in zeroed.layers.iter().enumerate() {
            tensors.push((
                format!("layers.{i}.weight"),
                TestTensor {
                    dtype: Dtype::I8,
                    shape: vec![layer.weights.len()],
                    data: layer.weights.iter().map(|&v| v as u8).collect(),
                },
            ));
            let mut bias_bytes = Vec::with_capacity(layer.bias.len() * 4);
            for b in &layer.bias {
                bias_bytes.extend_from_slice(&b.to_le_bytes());
            }
            tensors.push((
                format!("layers.{i}.bias"),
                TestTensor {
                    dtype: Dtype::I32,
                    shape: vec![layer.bias.len()],
                    data: bias_bytes,
                },
            ));
        }
        serialize_to_file(tensors, &None, &dir.join("model.safetensors"))
            .expect("serialize safetensors");

        let bundle = ModelBundle::load_from_dir(&dir).expect("load bundle");
        assert_eq!(bundle.config.classes.len(), 3);
        assert_eq!(bundle.weights.layers.len(), zeroed.layers.len());

        std::fs::remove_dir_all(dir).expect("cleanup");
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tmp_dir("missing");
        assert!(ModelBundle::load_from_dir(&dir).is_err());
        std::fs::remove_dir_all(dir).expect("cleanup");
    }
}
