//! Orpheus speech generator
//!
//! Orpheus is a Llama-3 causal LM fine-tuned to answer a text prompt with a
//! stream of SNAC audio tokens. The transformer itself comes from
//! `candle-transformers`; this module owns prompt construction, the
//! sampling loop and extraction of the audio segment.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::frames::FrameLayout;
use crate::generation::{
    apply_repetition_penalty, extract_speech_tokens, sample, AudioTokenMask, SamplingContext,
    SpeechMarkers,
};
use crate::tokenizer::{PromptFormat, TextTokenizer};
use crate::{SpeechGenerator, SynthesisOptions};

/// Safetensors files of a checkpoint directory.
///
/// Sharded checkpoints list their files in `model.safetensors.index.json`;
/// otherwise a single `model.safetensors` is expected.
pub fn weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let index_path = dir.join("model.safetensors.index.json");
    if index_path.exists() {
        let content = std::fs::read_to_string(&index_path)
            .with_context(|| format!("Failed to read {}", index_path.display()))?;
        let index: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", index_path.display()))?;
        let weight_map = index
            .get("weight_map")
            .and_then(|v| v.as_object())
            .with_context(|| format!("No weight_map in {}", index_path.display()))?;
        let shards: BTreeSet<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
        return Ok(shards.into_iter().map(|f| dir.join(f)).collect());
    }

    let single = dir.join("model.safetensors");
    if single.exists() {
        return Ok(vec![single]);
    }
    anyhow::bail!("No safetensors weights found in {}", dir.display())
}

/// Text-to-audio-token generator backed by a Llama checkpoint.
///
/// The weights are read-only after loading; every call to
/// [`generate`](SpeechGenerator::generate) builds its own KV cache, so one
/// instance can serve concurrent requests.
pub struct OrpheusGenerator {
    model: Llama,
    config: Config,
    tokenizer: TextTokenizer,
    prompt_format: PromptFormat,
    markers: SpeechMarkers,
    audio_mask: Option<AudioTokenMask>,
    dtype: DType,
    device: Device,
}

impl OrpheusGenerator {
    /// Load from a checkpoint directory with `config.json`, safetensors
    /// weights and (unless `tokenizer_dir` is given) `tokenizer.json`.
    pub fn from_pretrained(
        model_dir: &Path,
        tokenizer_dir: Option<&Path>,
        device: &Device,
    ) -> Result<Self> {
        let config_path = model_dir.join("config.json");
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let llama_config: LlamaConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        let config = llama_config.into_config(false);

        let tokenizer_dir = tokenizer_dir.unwrap_or(model_dir);
        let tokenizer = TextTokenizer::from_pretrained(&tokenizer_dir.to_string_lossy())?;

        let dtype = crate::compute_dtype_for_device(device);
        let files = weight_files(model_dir)?;
        tracing::info!(
            shards = files.len(),
            layers = config.num_hidden_layers,
            vocab = config.vocab_size,
            ?dtype,
            "Loading Orpheus generator from {}",
            model_dir.display()
        );
        // SAFETY: weight files are memory-mapped read-only and not modified
        // while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files, dtype, device)? };
        let model = Llama::load(vb, &config).context("Failed to build Llama model")?;

        Ok(Self {
            model,
            config,
            tokenizer,
            prompt_format: PromptFormat::orpheus(),
            markers: SpeechMarkers::orpheus(),
            audio_mask: None,
            dtype,
            device: device.clone(),
        })
    }

    /// Only let the sampler pick ids that `layout` accepts, plus the
    /// speech markers.
    pub fn with_audio_mask(mut self, layout: &FrameLayout) -> Self {
        self.audio_mask = Some(AudioTokenMask::new(
            self.config.vocab_size,
            layout,
            &self.markers,
        ));
        self
    }

    pub fn tokenizer(&self) -> &TextTokenizer {
        &self.tokenizer
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Run the sampling loop on an already tokenized prompt and return the
    /// full generated sequence (markers included).
    pub fn generate_ids(&self, prompt: &[u32], options: &SynthesisOptions) -> Result<Vec<u32>> {
        let mut gen_config = options.to_gen_config();
        if gen_config.stop_tokens.is_empty() {
            gen_config.stop_tokens = self.markers.stop_tokens();
        }
        let mut ctx = SamplingContext::new(options.seed);
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;

        let mut history = prompt.to_vec();
        let mut generated = Vec::with_capacity(gen_config.max_new_tokens);
        let mut input = prompt.to_vec();
        let mut index_pos = 0;

        for _ in 0..gen_config.max_new_tokens {
            if index_pos + input.len() > self.config.max_position_embeddings {
                tracing::warn!(
                    position = index_pos,
                    "context window exhausted, stopping generation"
                );
                break;
            }
            let x = Tensor::new(input.as_slice(), &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&x, index_pos, &mut cache)?;
            index_pos += input.len();

            let mut row: Vec<f32> = logits.squeeze(0)?.to_dtype(DType::F32)?.to_vec1()?;
            apply_repetition_penalty(&mut row, &history, gen_config.repetition_penalty);
            if let Some(mask) = &self.audio_mask {
                mask.apply(&mut row);
            }

            let next = sample(&row, &gen_config, &mut ctx)?;
            history.push(next);
            generated.push(next);
            if gen_config.stop_tokens.contains(&next) {
                break;
            }
            input.clear();
            input.push(next);
        }

        tracing::debug!(
            prompt = prompt.len(),
            generated = generated.len(),
            "generation finished"
        );
        Ok(generated)
    }
}

impl SpeechGenerator for OrpheusGenerator {
    fn generate(
        &self,
        text: &str,
        voice: Option<&str>,
        options: &SynthesisOptions,
    ) -> Result<Vec<u32>> {
        let prompt = self
            .tokenizer
            .build_prompt(text, voice, &self.prompt_format)?;
        let generated = self.generate_ids(&prompt, options)?;
        Ok(extract_speech_tokens(&generated, &self.markers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_files_single() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.safetensors"), b"").unwrap();
        let files = weight_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("model.safetensors")]);
    }

    #[test]
    fn test_weight_files_sharded_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = r#"{
            "metadata": {"total_size": 1},
            "weight_map": {
                "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                "model.layers.0.mlp.up_proj.weight": "model-00002-of-00002.safetensors",
                "model.norm.weight": "model-00002-of-00002.safetensors"
            }
        }"#;
        std::fs::write(dir.path().join("model.safetensors.index.json"), index).unwrap();
        let files = weight_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_weight_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = weight_files(dir.path()).unwrap_err().to_string();
        assert!(err.contains("No safetensors weights"));
    }

    #[test]
    fn test_from_pretrained_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(OrpheusGenerator::from_pretrained(dir.path(), None, &Device::Cpu).is_err());
    }
}
