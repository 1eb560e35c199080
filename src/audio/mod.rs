//! Audio output for synthesized speech
//!
//! This module provides:
//! - [`AudioBuffer`], the waveform type returned by synthesis
//! - WAV encoding to files and to in-memory bytes (16-bit PCM, mono)

mod io;

pub use io::{encode_wav, load_wav, save_wav, AudioBuffer};

/// Output sample rate of the SNAC 24kHz decoder
pub const SAMPLE_RATE: u32 = 24000;
