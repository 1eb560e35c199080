//! SNAC codec configuration (`config.json` of a SNAC checkpoint)

use anyhow::{bail, Context, Result};
use candle_transformers::models::snac;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyperparameters of a SNAC model.
///
/// Field names match the checkpoint's `config.json`. Defaults are the
/// 24kHz speech model that Orpheus was trained against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnacConfig {
    pub sampling_rate: u32,
    pub encoder_dim: usize,
    pub encoder_rates: Vec<usize>,
    pub decoder_dim: usize,
    pub decoder_rates: Vec<usize>,
    pub attn_window_size: Option<usize>,
    pub codebook_size: usize,
    pub codebook_dim: usize,
    /// Temporal stride of each quantizer level, coarse first
    pub vq_strides: Vec<usize>,
    pub noise: bool,
    pub depthwise: bool,
}

impl Default for SnacConfig {
    fn default() -> Self {
        Self {
            sampling_rate: crate::audio::SAMPLE_RATE,
            encoder_dim: 48,
            encoder_rates: vec![2, 4, 8, 8],
            decoder_dim: 1024,
            decoder_rates: vec![8, 8, 4, 2],
            attn_window_size: None,
            codebook_size: 4096,
            codebook_dim: 8,
            vq_strides: vec![4, 2, 1],
            noise: true,
            depthwise: true,
        }
    }
}

impl SnacConfig {
    /// Load and check a `config.json`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read SNAC config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse SNAC config: {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Reject configurations the codec cannot be built from.
    pub fn check(&self) -> Result<()> {
        if self.vq_strides.is_empty() || self.vq_strides.contains(&0) {
            bail!("vq_strides must be non-empty and positive: {:?}", self.vq_strides);
        }
        let coarse = self.vq_strides[0];
        if let Some(&s) = self.vq_strides.iter().find(|&&s| coarse % s != 0) {
            bail!("vq stride {s} does not divide the coarsest stride {coarse}");
        }
        if self.encoder_rates.contains(&0) || self.decoder_rates.contains(&0) {
            bail!(
                "encoder_rates {:?} and decoder_rates {:?} must be positive",
                self.encoder_rates,
                self.decoder_rates
            );
        }
        if self.decoder_dim >> self.decoder_rates.len() == 0 {
            bail!(
                "decoder_dim {} too small for {} upsampling stages",
                self.decoder_dim,
                self.decoder_rates.len()
            );
        }
        Ok(())
    }

    /// Configuration for the `candle-transformers` SNAC model.
    pub fn to_model_config(&self) -> snac::Config {
        snac::Config {
            sampling_rate: self.sampling_rate as usize,
            encoder_dim: self.encoder_dim,
            encoder_rates: self.encoder_rates.clone(),
            decoder_dim: self.decoder_dim,
            decoder_rates: self.decoder_rates.clone(),
            attn_window_size: self.attn_window_size,
            codebook_size: self.codebook_size,
            codebook_dim: self.codebook_dim,
            vq_strides: self.vq_strides.clone(),
            noise: self.noise,
            depthwise: self.depthwise,
        }
    }

    /// `encoder_dim * 2^len(encoder_rates)`
    pub fn latent_dim(&self) -> usize {
        self.encoder_dim << self.encoder_rates.len()
    }

    /// Samples per latent step.
    pub fn hop_length(&self) -> usize {
        self.encoder_rates.iter().product()
    }

    pub fn num_levels(&self) -> usize {
        self.vq_strides.len()
    }

    /// Codes per frame at each quantizer level, coarse first.
    ///
    /// The coarsest level has one code per frame; a frame spans
    /// `vq_strides[0]` latent steps.
    pub fn level_ratios(&self) -> Vec<usize> {
        let coarse = self.vq_strides[0];
        self.vq_strides.iter().map(|&s| coarse / s).collect()
    }

    /// Output samples per coarse frame.
    pub fn samples_per_frame(&self) -> usize {
        self.vq_strides[0] * self.hop_length()
    }
}
