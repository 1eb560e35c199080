//! Generation and sampling utilities
//!
//! This module provides:
//! - Sampling strategies (greedy, top-k, top-p, temperature)
//! - Generation configuration
//! - Repetition penalty
//! - Per-session RNG via [`SamplingContext`] for reproducible generation
//! - Speech segment extraction and audio-only logit masking

mod sampling;
pub mod speech;

pub use sampling::{
    apply_repetition_penalty, greedy_sample, sample, GenerationConfig, SamplingContext,
};

pub use speech::{extract_speech_tokens, AudioTokenMask, SpeechMarkers};
