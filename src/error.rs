//! Error types for frame layout construction and token-to-audio synthesis.
//!
//! Everything the frame pipeline can reject is a structural problem with
//! the token stream or the layer tensors, so none of these are retried.

use std::ops::Range;

use thiserror::Error;

/// Failure anywhere between a raw generator token stream and a waveform.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A raw token does not fall in the vocabulary range of the layer its
    /// frame position assigns it to.
    #[error(
        "token {raw_id} is out of range for layer {layer} position {position} (expected {range:?})"
    )]
    OutOfRangeToken {
        raw_id: u32,
        layer: usize,
        position: usize,
        /// Accepted raw-id range for this layer position.
        range: Range<u64>,
    },

    /// A codebook index handed to the encoder side is past the codebook of
    /// its layer position.
    #[error(
        "code {code} is out of range for layer {layer} position {position} \
         (codebook size {codebook_size})"
    )]
    CodeOutOfRange {
        code: u32,
        layer: usize,
        position: usize,
        codebook_size: u64,
    },

    /// Layer index is not part of the configured layer ratio.
    #[error("unknown layer {layer} (layout has {layers} layers)")]
    UnknownLayer { layer: usize, layers: usize },

    /// Position inside a layer exceeds that layer's tokens per frame.
    #[error("position {position} is out of range for layer {layer} ({ratio} tokens per frame)")]
    UnknownPosition {
        layer: usize,
        position: usize,
        ratio: usize,
    },

    /// A frame slice does not hold exactly one frame worth of tokens.
    #[error("frame has {actual} tokens, expected {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    /// Output buffers passed for demultiplexing do not match the layer count.
    #[error("got {actual} layer buffers, layout has {expected} layers")]
    LayerCountMismatch { expected: usize, actual: usize },

    /// Not a single complete frame was produced.
    #[error("no audio generated: token stream holds no complete frame")]
    EmptyFrameGroup,

    /// Layer tensors handed to the decoder disagree on their frame count.
    #[error("layer {layer} has {actual} codes, expected {expected}")]
    LayerLengthMismatch {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    /// The codec decoder rejected the layer codes.
    #[error("codec decode failed: {0}")]
    CodecDecode(#[source] anyhow::Error),

    /// The token generator failed; passed through untouched.
    #[error("generator failed: {0}")]
    Generator(#[source] anyhow::Error),

    /// A demultiplexing error located at a specific frame of the stream.
    #[error("frame {frame}: {source}")]
    InFrame {
        frame: usize,
        #[source]
        source: Box<SynthesisError>,
    },
}

impl SynthesisError {
    /// Attach the index of the frame that produced this error.
    pub fn in_frame(self, frame: usize) -> Self {
        match self {
            err @ SynthesisError::InFrame { .. } => err,
            err => SynthesisError::InFrame {
                frame,
                source: Box::new(err),
            },
        }
    }

    /// The underlying error, looking through frame annotations.
    pub fn root(&self) -> &SynthesisError {
        match self {
            SynthesisError::InFrame { source, .. } => source.root(),
            err => err,
        }
    }

    /// Short variant tag, used in logs and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            SynthesisError::OutOfRangeToken { .. } => "out_of_range_token",
            SynthesisError::CodeOutOfRange { .. } => "code_out_of_range",
            SynthesisError::UnknownLayer { .. } => "unknown_layer",
            SynthesisError::UnknownPosition { .. } => "unknown_position",
            SynthesisError::FrameSizeMismatch { .. } => "frame_size_mismatch",
            SynthesisError::LayerCountMismatch { .. } => "layer_count_mismatch",
            SynthesisError::EmptyFrameGroup => "empty_frame_group",
            SynthesisError::LayerLengthMismatch { .. } => "layer_length_mismatch",
            SynthesisError::CodecDecode(_) => "codec_decode_error",
            SynthesisError::Generator(_) => "generator_error",
            SynthesisError::InFrame { .. } => "in_frame",
        }
    }
}

/// Rejected frame layout table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout must define at least one layer and one slot")]
    Empty,

    #[error("layer {layer} has a ratio of zero")]
    ZeroRatio { layer: usize },

    #[error("layer ratio sums to {sum} but the frame has {frame_size} slots")]
    RatioSumMismatch { sum: usize, frame_size: usize },

    #[error("slot {slot} refers to layer {layer}, layout has {layers} layers")]
    SlotLayerOutOfRange {
        slot: usize,
        layer: usize,
        layers: usize,
    },

    #[error("layer {layer} is assigned {assigned} slots but its ratio is {ratio}")]
    SlotCountMismatch {
        layer: usize,
        assigned: usize,
        ratio: usize,
    },

    #[error("expected {expected} offsets, got {actual}")]
    OffsetCountMismatch { expected: usize, actual: usize },

    #[error("expected {expected} codebook sizes, got {actual}")]
    CodebookCountMismatch { expected: usize, actual: usize },

    #[error("layer {layer} has an empty codebook")]
    ZeroCodebook { layer: usize },

    #[error(
        "vocabulary ranges of slot {first} (layer {first_layer}) \
         and slot {second} (layer {second_layer}) overlap"
    )]
    OverlappingRanges {
        first: usize,
        first_layer: usize,
        second: usize,
        second_layer: usize,
    },

    #[error("slot {slot} vocabulary range does not fit in 32-bit token ids")]
    OffsetOverflow { slot: usize },
}
