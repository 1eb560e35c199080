//! # Orpheus TTS
//!
//! Pure Rust inference for [Orpheus](https://github.com/canopyai/Orpheus-TTS)
//! text-to-speech: a Llama language model that speaks in SNAC codec tokens.
//!
//! ## Features
//!
//! - **CPU inference**, with **CUDA** and **Metal** behind cargo features
//! - **Configurable frame layouts**: the token interleaving is a validated
//!   table, loadable from JSON, not hard-coded slicing
//! - **Typed failures**: malformed token streams are reported with the
//!   offending token, layer and frame, never decoded into noise
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orpheus_tts::{OrpheusTTS, SynthesisOptions, auto_device};
//!
//! let device = auto_device()?;
//! let tts = OrpheusTTS::from_pretrained("orpheus-3b-0.1-ft", "snac_24khz", None, device)?;
//!
//! let audio = tts.synthesize("Hello, world!", Some("tara"), None)?;
//! audio.save("output.wav")?;
//!
//! let options = SynthesisOptions {
//!     temperature: 0.6,
//!     seed: Some(42),
//!     ..Default::default()
//! };
//! let audio = tts.synthesize("Reproducible take.", Some("leo"), Some(options))?;
//! ```
//!
//! ## Architecture
//!
//! 1. **Generator** ([`SpeechGenerator`]): the LM turns the prompt
//!    `"{voice}: {text}"` into a flat stream of raw token ids, seven per
//!    audio frame.
//! 2. **Frame pipeline** ([`frames`]): each raw id is mapped back to a
//!    codebook index and routed to its codec layer (1, 2 and 4 codes per
//!    frame for the three SNAC levels).
//! 3. **Codec** ([`CodecDecoder`]): SNAC decodes the three layers to 24kHz
//!    mono audio, 2048 samples per frame.
//!
//! Stages exchange plain values, so each can be driven on its own: the
//! [`Synthesizer::synthesize_tokens`] entry point skips the generator.

pub mod audio;
pub mod error;
pub mod frames;
pub mod generation;
#[cfg(feature = "hub")]
pub mod hub;
pub mod models;
pub mod tokenizer;

use anyhow::Result;
use candle_core::{DType, Device};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Re-exports for convenience
pub use audio::AudioBuffer;
pub use error::{LayoutError, SynthesisError};
pub use frames::{
    CodecDecoder, FrameLayout, FramePipeline, LayerSequence, LayoutSpec, OffsetTable,
};
pub use generation::{GenerationConfig, SamplingContext, SpeechMarkers};
#[cfg(feature = "hub")]
pub use hub::ModelPaths;
pub use models::{OrpheusGenerator, SnacConfig, SnacDecoder};
pub use tokenizer::{PromptFormat, TextTokenizer};

/// A language model that speaks in codec tokens.
///
/// Returns the raw audio token ids for `text`, with the prompt and any
/// control markers already removed. No range checking is expected here;
/// the frame pipeline validates every id.
pub trait SpeechGenerator: Send + Sync {
    fn generate(
        &self,
        text: &str,
        voice: Option<&str>,
        options: &SynthesisOptions,
    ) -> Result<Vec<u32>>;
}

/// Options for speech synthesis
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Maximum number of tokens the generator may produce
    pub max_new_tokens: usize,
    /// Sampling temperature (higher = more random)
    pub temperature: f64,
    /// Top-k sampling (0 = disabled)
    pub top_k: usize,
    /// Top-p (nucleus) sampling (1.0 = disabled)
    pub top_p: f64,
    /// Repetition penalty (1.0 = disabled)
    pub repetition_penalty: f64,
    /// Random seed for deterministic generation. `None` = non-deterministic.
    pub seed: Option<u64>,
}

impl SynthesisOptions {
    /// Convert to a [`GenerationConfig`] for the generation loop.
    pub fn to_gen_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            repetition_penalty: self.repetition_penalty,
            stop_tokens: Vec::new(),
        }
    }
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        let defaults = GenerationConfig::default();
        Self {
            max_new_tokens: defaults.max_new_tokens,
            temperature: defaults.temperature,
            top_k: defaults.top_k,
            top_p: defaults.top_p,
            repetition_penalty: defaults.repetition_penalty,
            seed: None,
        }
    }
}

/// Per-stage timing breakdown from a synthesis run.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisTiming {
    /// Time spent in the generator (ms).
    pub generation_ms: f64,
    /// Raw audio tokens returned by the generator.
    pub tokens: usize,
    /// Time spent in frame assembly and codec decoding (ms).
    pub decode_ms: f64,
    /// Seconds of audio produced.
    pub audio_seconds: f32,
}

/// Text to waveform over a generator, a frame layout and a codec.
///
/// Every part is read-only after construction, so one instance can be
/// shared behind an `Arc` by concurrent requests.
pub struct Synthesizer<G, C> {
    generator: G,
    codec: C,
    pipeline: FramePipeline,
}

/// The Orpheus 3B generator with the SNAC 24kHz decoder.
pub type OrpheusTTS = Synthesizer<OrpheusGenerator, SnacDecoder>;

impl<G: SpeechGenerator, C: CodecDecoder> Synthesizer<G, C> {
    pub fn new(generator: G, codec: C, layout: Arc<FrameLayout>) -> Self {
        Self {
            generator,
            codec,
            pipeline: FramePipeline::new(layout),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn layout(&self) -> &FrameLayout {
        self.pipeline.layout()
    }

    pub fn sample_rate(&self) -> u32 {
        self.codec.sample_rate()
    }

    /// Synthesize speech for `text`, optionally in a named voice.
    pub fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        options: Option<SynthesisOptions>,
    ) -> Result<AudioBuffer, SynthesisError> {
        self.synthesize_with_timing(text, voice, options)
            .map(|(audio, _)| audio)
    }

    /// Like [`synthesize`](Self::synthesize), also reporting stage timings.
    pub fn synthesize_with_timing(
        &self,
        text: &str,
        voice: Option<&str>,
        options: Option<SynthesisOptions>,
    ) -> Result<(AudioBuffer, SynthesisTiming), SynthesisError> {
        let options = options.unwrap_or_default();

        let start = Instant::now();
        let tokens = self
            .generator
            .generate(text, voice, &options)
            .map_err(SynthesisError::Generator)?;
        let generation_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(tokens = tokens.len(), generation_ms, "generator finished");

        let start = Instant::now();
        let audio = self.pipeline.synthesize_tokens(&self.codec, &tokens)?;
        let decode_ms = start.elapsed().as_secs_f64() * 1000.0;

        let timing = SynthesisTiming {
            generation_ms,
            tokens: tokens.len(),
            decode_ms,
            audio_seconds: audio.duration(),
        };
        tracing::info!(
            audio_seconds = timing.audio_seconds,
            generation_ms = timing.generation_ms,
            decode_ms = timing.decode_ms,
            "synthesized speech"
        );
        Ok((audio, timing))
    }

    /// Decode an already generated raw token stream.
    pub fn synthesize_tokens(
        &self,
        raw_token_stream: &[u32],
    ) -> Result<AudioBuffer, SynthesisError> {
        self.pipeline.synthesize_tokens(&self.codec, raw_token_stream)
    }
}

impl OrpheusTTS {
    /// Load the generator from `model_dir` and SNAC from `snac_dir`.
    ///
    /// `layout` defaults to [`FrameLayout::orpheus_snac_24khz`]. The text
    /// tokenizer is read from `model_dir/tokenizer.json`.
    pub fn from_pretrained(
        model_dir: impl AsRef<Path>,
        snac_dir: impl AsRef<Path>,
        layout: Option<FrameLayout>,
        device: Device,
    ) -> Result<Self> {
        Self::from_pretrained_with_tokenizer(model_dir, None, snac_dir, layout, device)
    }

    /// Load with an explicit tokenizer directory, file or hub ID.
    pub fn from_pretrained_with_tokenizer(
        model_dir: impl AsRef<Path>,
        tokenizer_dir: Option<&Path>,
        snac_dir: impl AsRef<Path>,
        layout: Option<FrameLayout>,
        device: Device,
    ) -> Result<Self> {
        let layout = layout.unwrap_or_else(FrameLayout::orpheus_snac_24khz);
        tracing::info!("Device: {}", device_info(&device));

        let codec = SnacDecoder::from_pretrained(snac_dir, &device)?;
        check_layout_matches_codec(&layout, codec.config())?;
        let generator =
            OrpheusGenerator::from_pretrained(model_dir.as_ref(), tokenizer_dir, &device)?;

        Ok(Self::new(generator, codec, Arc::new(layout)))
    }

    /// Load from files downloaded by [`ModelPaths::download`].
    #[cfg(feature = "hub")]
    pub fn from_paths(
        paths: &ModelPaths,
        layout: Option<FrameLayout>,
        device: Device,
    ) -> Result<Self> {
        Self::from_pretrained(&paths.model_dir, &paths.snac_dir, layout, device)
    }
}

/// A layout must feed the codec one sequence per quantizer level, at the
/// level's rate, with indices inside its codebook.
pub fn check_layout_matches_codec(layout: &FrameLayout, codec: &SnacConfig) -> Result<()> {
    let ratios = codec.level_ratios();
    if layout.layer_ratio() != ratios.as_slice() {
        anyhow::bail!(
            "frame layout '{}' has layer ratio {:?}, SNAC expects {:?}",
            layout.name(),
            layout.layer_ratio(),
            ratios
        );
    }
    for layer in 0..layout.num_layers() {
        let size = layout.codebook_size(layer).unwrap_or_default() as usize;
        if size > codec.codebook_size {
            anyhow::bail!(
                "frame layout '{}' allows {} codes in layer {}, SNAC codebook has {}",
                layout.name(),
                size,
                layer,
                codec.codebook_size
            );
        }
    }
    Ok(())
}

/// Select the best available compute device for inference.
///
/// Checks for available hardware in order: CUDA → Metal → CPU.
/// Falls back to CPU if no GPU acceleration is available.
pub fn auto_device() -> Result<Device> {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::cuda_if_available(0) {
            if device.is_cuda() {
                tracing::info!("Using CUDA device");
                return Ok(device);
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            tracing::info!("Using Metal device");
            return Ok(device);
        }
    }

    tracing::info!("Using CPU device");
    Ok(Device::Cpu)
}

/// Parse a device string into a [`Device`].
///
/// Supported formats: `auto`, `cpu`, `cuda`, `cuda:N`, `metal`.
pub fn parse_device(device_str: &str) -> Result<Device> {
    match device_str.to_lowercase().as_str() {
        "auto" => auto_device(),
        "cpu" => Ok(Device::Cpu),
        s if s.starts_with("cuda") => {
            #[cfg(feature = "cuda")]
            {
                let ordinal: usize = match s.strip_prefix("cuda:") {
                    Some(idx) => idx
                        .parse()
                        .map_err(|e| anyhow::anyhow!("invalid CUDA device index: {e}"))?,
                    None => 0,
                };
                Device::cuda_if_available(ordinal)
                    .map_err(|e| anyhow::anyhow!("failed to init CUDA device {ordinal}: {e}"))
            }
            #[cfg(not(feature = "cuda"))]
            anyhow::bail!("CUDA support not compiled in. Rebuild with: cargo build --features cuda")
        }
        "metal" => {
            #[cfg(feature = "metal")]
            {
                Device::new_metal(0)
                    .map_err(|e| anyhow::anyhow!("failed to init Metal device: {e}"))
            }
            #[cfg(not(feature = "metal"))]
            anyhow::bail!(
                "Metal support not compiled in. Rebuild with: cargo build --features metal"
            )
        }
        other => {
            anyhow::bail!("unknown device '{other}'. Supported: auto, cpu, cuda, cuda:N, metal")
        }
    }
}

/// Human-readable label for a [`Device`].
pub fn device_info(device: &Device) -> String {
    match device {
        Device::Cpu => "CPU".to_string(),
        Device::Cuda(_) => "CUDA".to_string(),
        Device::Metal(_) => "Metal".to_string(),
    }
}

/// Compute dtype for the generator: `BF16` on CUDA/Metal, `F32` on CPU.
pub fn compute_dtype_for_device(device: &Device) -> DType {
    if device.is_cuda() || device.is_metal() {
        DType::BF16
    } else {
        DType::F32
    }
}
