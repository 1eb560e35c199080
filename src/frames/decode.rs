//! Boundary between assembled layer codes and the codec decoder.

use super::assembler::LayerSequence;
use super::layout::FrameLayout;
use crate::audio::AudioBuffer;
use crate::error::SynthesisError;

/// A multi-scale codec that turns per-layer codebook indices into audio.
///
/// `layers` holds one sequence per quantizer level, coarse to fine, all
/// describing the same number of frames.
pub trait CodecDecoder: Send + Sync {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Decode layer codes to mono samples.
    fn decode_layers(&self, layers: &[LayerSequence]) -> anyhow::Result<Vec<f32>>;
}

impl<C: CodecDecoder + ?Sized> CodecDecoder for &C {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn decode_layers(&self, layers: &[LayerSequence]) -> anyhow::Result<Vec<f32>> {
        (**self).decode_layers(layers)
    }
}

impl FrameLayout {
    /// Check layer shapes against this layout, then run the codec.
    ///
    /// Shape problems are reported before the codec is touched. Codec
    /// failures come back as [`SynthesisError::CodecDecode`] and are not
    /// retried: the same codes fail the same way.
    pub fn decode<C: CodecDecoder + ?Sized>(
        &self,
        codec: &C,
        layer_sequences: &[LayerSequence],
    ) -> Result<AudioBuffer, SynthesisError> {
        let num_frames = self.frame_count(layer_sequences)?;

        let samples = codec
            .decode_layers(layer_sequences)
            .map_err(SynthesisError::CodecDecode)?;
        tracing::debug!(
            frames = num_frames,
            samples = samples.len(),
            "codec decoded layer sequences"
        );
        Ok(AudioBuffer::new(samples, codec.sample_rate()))
    }
}
