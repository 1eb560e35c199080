//! Per-frame demultiplexing of raw tokens into layer slices.

use super::layout::FrameLayout;
use crate::error::SynthesisError;

impl FrameLayout {
    /// Split one frame of raw tokens into per-layer codebook indices.
    ///
    /// Returns one slice per layer, coarse to fine, each `layer_ratio[i]`
    /// long. Positions are assigned by the interleave table, never inferred.
    pub fn demux_frame(&self, frame_tokens: &[u32]) -> Result<Vec<Vec<u32>>, SynthesisError> {
        let mut layers: Vec<Vec<u32>> = self
            .layer_ratio()
            .iter()
            .map(|&r| Vec::with_capacity(r))
            .collect();
        self.demux_frame_into(frame_tokens, &mut layers)?;
        Ok(layers)
    }

    /// Like [`demux_frame`](Self::demux_frame), appending onto `layers`.
    ///
    /// `layers` must hold one buffer per layer. On error the buffers may
    /// contain part of the frame.
    pub fn demux_frame_into(
        &self,
        frame_tokens: &[u32],
        layers: &mut [Vec<u32>],
    ) -> Result<(), SynthesisError> {
        if frame_tokens.len() != self.frame_size() {
            return Err(SynthesisError::FrameSizeMismatch {
                expected: self.frame_size(),
                actual: frame_tokens.len(),
            });
        }
        if layers.len() != self.num_layers() {
            return Err(SynthesisError::LayerCountMismatch {
                expected: self.num_layers(),
                actual: layers.len(),
            });
        }

        // Slot positions run in frame order, so pushing keeps each layer's
        // slice ordered by position.
        for (&raw, slot) in frame_tokens.iter().zip(self.slots()) {
            let code = self.map_token(raw, slot.layer, slot.position)?;
            layers[slot.layer].push(code);
        }
        Ok(())
    }
}
