//! SNAC decoder behind the [`CodecDecoder`] boundary
//!
//! The network itself is `candle_transformers::models::snac::Model`. This
//! module loads a checkpoint into it and turns per-layer code sequences
//! into a waveform.

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::snac;
use std::path::Path;

use super::config::SnacConfig;
use crate::frames::{CodecDecoder, LayerSequence};

/// Weight files tried in order inside a SNAC checkpoint directory.
const SAFETENSORS_FILES: [&str; 2] = ["model.safetensors", "snac_24khz.safetensors"];

/// Checkpoints saved with `torch.nn.utils.weight_norm` name the weight-norm
/// factors `weight_g` / `weight_v` instead of the parametrization names the
/// model asks for.
fn uses_legacy_weight_norm(vb: &VarBuilder) -> bool {
    vb.contains_tensor("quantizer.quantizers.0.out_proj.weight_g")
}

fn legacy_weight_norm_name(name: &str) -> String {
    name.replace("parametrizations.weight.original0", "weight_g")
        .replace("parametrizations.weight.original1", "weight_v")
}

/// Pretrained SNAC codec used as the audio decoder.
pub struct SnacDecoder {
    model: snac::Model,
    config: SnacConfig,
    device: Device,
}

impl SnacDecoder {
    pub fn new(config: SnacConfig, vb: VarBuilder) -> Result<Self> {
        config.check()?;
        let device = vb.device().clone();
        let vb = if uses_legacy_weight_norm(&vb) {
            vb.rename_f(legacy_weight_norm_name)
        } else {
            vb
        };
        let model = snac::Model::new(&config.to_model_config(), vb)
            .context("Failed to build SNAC model")?;
        Ok(Self {
            model,
            config,
            device,
        })
    }

    /// Load `config.json` and the weights of a SNAC checkpoint directory
    /// (`model.safetensors`, `snac_24khz.safetensors` or `pytorch_model.bin`).
    ///
    /// Weights are kept in F32; the decoder is small and the transposed
    /// convolutions are not implemented for half precision on every backend.
    pub fn from_pretrained<P: AsRef<Path>>(dir: P, device: &Device) -> Result<Self> {
        let dir = dir.as_ref();
        let config_path = dir.join("config.json");
        let config = if config_path.exists() {
            SnacConfig::from_file(&config_path)?
        } else {
            tracing::warn!(
                "No config.json in {}, assuming SNAC 24kHz defaults",
                dir.display()
            );
            SnacConfig::default()
        };

        let safetensors = SAFETENSORS_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists());
        let vb = match safetensors {
            // SAFETY: the file is memory-mapped read-only and not modified
            // while the decoder is alive.
            Some(path) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)?
            },
            None => VarBuilder::from_pth(dir.join("pytorch_model.bin"), DType::F32, device)
                .with_context(|| format!("No SNAC weights found in {}", dir.display()))?,
        };

        tracing::info!(
            sample_rate = config.sampling_rate,
            levels = config.num_levels(),
            "Loading SNAC decoder from {}",
            dir.display()
        );
        Self::new(config, vb)
    }

    pub fn config(&self) -> &SnacConfig {
        &self.config
    }

    /// Decode per-level code tensors, each [batch, len_i], to audio
    /// [batch, 1, samples] in [-1, 1].
    pub fn decode(&self, codes: &[Tensor]) -> Result<Tensor> {
        if codes.len() != self.config.num_levels() {
            bail!(
                "SNAC expects {} code levels, got {}",
                self.config.num_levels(),
                codes.len()
            );
        }
        let codes: Vec<&Tensor> = codes.iter().collect();
        let audio = self.model.decode(&codes)?;
        Ok(audio.tanh()?)
    }
}

impl CodecDecoder for SnacDecoder {
    fn sample_rate(&self) -> u32 {
        self.config.sampling_rate
    }

    fn decode_layers(&self, layers: &[LayerSequence]) -> Result<Vec<f32>> {
        let codes = layers
            .iter()
            .map(|seq| Tensor::new(seq.as_slice(), &self.device)?.unsqueeze(0))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let audio = self.decode(&codes)?;
        Ok(audio.flatten_all()?.to_dtype(DType::F32)?.to_vec1()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn tiny_config() -> SnacConfig {
        SnacConfig {
            encoder_dim: 2,
            encoder_rates: vec![2, 2],
            decoder_dim: 16,
            decoder_rates: vec![2, 2],
            codebook_size: 32,
            codebook_dim: 4,
            noise: false,
            depthwise: false,
            ..Default::default()
        }
    }

    /// Build once to create every variable, fill them with random values,
    /// then build again over the filled map.
    fn tiny_decoder(varmap: &VarMap) -> SnacDecoder {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        SnacDecoder::new(tiny_config(), vb).unwrap();
        for (name, var) in varmap.data().lock().unwrap().iter() {
            let value = if name.ends_with("alpha") {
                var.ones_like().unwrap()
            } else {
                Tensor::rand(-0.5f32, 0.5, var.shape(), &Device::Cpu).unwrap()
            };
            var.set(&value).unwrap();
        }
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        SnacDecoder::new(tiny_config(), vb).unwrap()
    }

    #[test]
    fn test_weight_names_follow_checkpoint_layout() {
        let varmap = VarMap::new();
        tiny_decoder(&varmap);
        let names: Vec<String> = varmap.data().lock().unwrap().keys().cloned().collect();
        for expected in [
            "quantizer.quantizers.0.codebook.weight",
            "quantizer.quantizers.2.out_proj.parametrizations.weight.original1",
            "decoder.model.0.parametrizations.weight.original0",
            "decoder.model.1.block.0.alpha",
            "decoder.model.2.block.4.block.3.bias",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_legacy_weight_norm_names() {
        assert_eq!(
            legacy_weight_norm_name("decoder.model.0.parametrizations.weight.original0"),
            "decoder.model.0.weight_g"
        );
        assert_eq!(
            legacy_weight_norm_name("decoder.model.0.parametrizations.weight.original1"),
            "decoder.model.0.weight_v"
        );
        assert_eq!(
            legacy_weight_norm_name("decoder.model.1.block.0.alpha"),
            "decoder.model.1.block.0.alpha"
        );
    }

    #[test]
    fn test_snac_decoder_output_length() {
        let varmap = VarMap::new();
        let decoder = tiny_decoder(&varmap);
        // Four latent steps per frame, each upsampled 2 * 2 = 4 times.
        let per_frame = decoder.config().samples_per_frame();
        assert_eq!(per_frame, 16);

        let layers = vec![vec![1, 2, 3], vec![0, 1, 2, 3, 4, 5], vec![7; 12]];
        let samples = decoder.decode_layers(&layers).unwrap();
        assert_eq!(samples.len(), 3 * per_frame);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        assert_eq!(decoder.sample_rate(), 24000);
    }

    #[test]
    fn test_snac_decoder_without_noise_is_deterministic() {
        let varmap = VarMap::new();
        let decoder = tiny_decoder(&varmap);
        let layers = vec![vec![5], vec![6, 7], vec![8, 9, 10, 11]];
        let a = decoder.decode_layers(&layers).unwrap();
        let b = decoder.decode_layers(&layers).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_snac_decoder_rejects_wrong_level_count() {
        let varmap = VarMap::new();
        let decoder = tiny_decoder(&varmap);
        let err = decoder.decode_layers(&[vec![1], vec![1, 2]]).unwrap_err();
        assert!(err.to_string().contains("expects 3 code levels"));
    }

    #[test]
    fn test_from_pretrained_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SnacDecoder::from_pretrained(dir.path(), &Device::Cpu).is_err());
    }
}
