//! Token stream to codec layer conversion
//!
//! Orpheus emits audio as one flat stream of token ids, seven per SNAC
//! frame. The SNAC decoder wants three separate code tensors at 1x, 2x
//! and 4x temporal resolution. This module does that regrouping:
//!
//! - [`FrameLayout`]: validated static tables (layer ratio, slot order,
//!   offsets, codebook sizes)
//! - [`FrameLayout::map_token`]: raw id to codebook index
//! - [`FrameLayout::validate`]: whole frames vs. trailing partial frame
//! - [`FrameLayout::demux_frame`]: one frame into per-layer slices
//! - [`FrameLayout::assemble`]: all frames into per-layer sequences
//! - [`FrameLayout::decode`]: shape checks, then the [`CodecDecoder`]
//!
//! Everything here is synchronous and free of shared mutable state; a
//! single `Arc<FrameLayout>` serves every request.

mod assembler;
mod decode;
mod demux;
pub mod layout;
mod validator;
mod vocab;

use std::sync::Arc;

pub use assembler::LayerSequence;
pub use decode::CodecDecoder;
pub use layout::{FrameLayout, LayoutSpec, OffsetTable, Slot};
pub use validator::FrameSplit;

use crate::audio::AudioBuffer;
use crate::error::SynthesisError;

/// Raw token stream to waveform, over a shared layout.
#[derive(Debug, Clone)]
pub struct FramePipeline {
    layout: Arc<FrameLayout>,
}

impl FramePipeline {
    pub fn new(layout: Arc<FrameLayout>) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Validate, demultiplex, assemble and decode a raw token stream.
    ///
    /// A trailing partial frame is dropped with a warning. A stream with no
    /// complete frame fails with [`SynthesisError::EmptyFrameGroup`]. Any
    /// malformed token aborts the whole request; no partial audio is
    /// returned.
    pub fn synthesize_tokens<C: CodecDecoder + ?Sized>(
        &self,
        codec: &C,
        raw_token_stream: &[u32],
    ) -> Result<AudioBuffer, SynthesisError> {
        let split = self.layout.validate(raw_token_stream);
        tracing::debug!(
            tokens = raw_token_stream.len(),
            frames = split.num_frames(self.layout.frame_size()),
            tail = split.tail.len(),
            "validated token stream"
        );
        let layers = self.layout.assemble(split.frames)?;
        self.layout.decode(codec, &layers)
    }
}
