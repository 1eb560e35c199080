//! Frame layout tables shared by every stage of the frame pipeline.
//!
//! A layout answers three questions for one codec/generator pair:
//! which layer each raw position of a frame belongs to, which offset the
//! generator added to keep that layer's codes in their own id range, and
//! how large each layer's codebook is. The tables come from the codec's
//! published frame layout and are validated once when the layout is built.

use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// Offsets the generator applied to layer codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetTable {
    /// One offset per layer, shared by every position of that layer.
    PerLayer(Vec<u32>),
    /// One offset per frame slot, in frame order.
    PerSlot(Vec<u32>),
}

/// Unvalidated layout description, as stored in a layout JSON file.
///
/// ```json
/// {
///   "name": "orpheus-snac-24khz",
///   "layer_ratio": [1, 2, 4],
///   "interleave": [0, 1, 2, 2, 1, 2, 2],
///   "audio_token_base": 128266,
///   "offsets": { "per_slot": [0, 4096, 8192, 12288, 16384, 20480, 24576] },
///   "codebook_sizes": [4096, 4096, 4096]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSpec {
    #[serde(default = "default_layout_name")]
    pub name: String,
    /// Tokens per frame for each layer, coarse to fine.
    pub layer_ratio: Vec<usize>,
    /// Layer index of every raw position in a frame.
    pub interleave: Vec<usize>,
    /// Added to every offset; the first id of the generator's audio vocabulary.
    #[serde(default)]
    pub audio_token_base: u32,
    pub offsets: OffsetTable,
    pub codebook_sizes: Vec<u32>,
}

fn default_layout_name() -> String {
    "custom".to_string()
}

/// Where a raw frame position lands: its layer and its index within that
/// layer's per-frame slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub layer: usize,
    pub position: usize,
}

/// Validated, immutable frame layout.
#[derive(Debug, Clone)]
pub struct FrameLayout {
    name: String,
    layer_ratio: Vec<usize>,
    slots: Vec<Slot>,
    /// Absolute offsets (`audio_token_base` included), `[layer][position]`.
    offsets: Vec<Vec<u32>>,
    codebook_sizes: Vec<u32>,
    audio_token_base: u32,
}

impl FrameLayout {
    /// Validate a layout description.
    pub fn new(spec: LayoutSpec) -> Result<Self, LayoutError> {
        let LayoutSpec {
            name,
            layer_ratio,
            interleave,
            audio_token_base,
            offsets,
            codebook_sizes,
        } = spec;

        if layer_ratio.is_empty() || interleave.is_empty() {
            return Err(LayoutError::Empty);
        }
        let layers = layer_ratio.len();
        let frame_size = interleave.len();

        if let Some(layer) = layer_ratio.iter().position(|&r| r == 0) {
            return Err(LayoutError::ZeroRatio { layer });
        }
        let sum: usize = layer_ratio.iter().sum();
        if sum != frame_size {
            return Err(LayoutError::RatioSumMismatch { sum, frame_size });
        }

        let mut assigned = vec![0usize; layers];
        let mut slots = Vec::with_capacity(frame_size);
        for (slot, &layer) in interleave.iter().enumerate() {
            if layer >= layers {
                return Err(LayoutError::SlotLayerOutOfRange {
                    slot,
                    layer,
                    layers,
                });
            }
            slots.push(Slot {
                layer,
                position: assigned[layer],
            });
            assigned[layer] += 1;
        }
        for (layer, (&assigned, &ratio)) in assigned.iter().zip(&layer_ratio).enumerate() {
            if assigned != ratio {
                return Err(LayoutError::SlotCountMismatch {
                    layer,
                    assigned,
                    ratio,
                });
            }
        }

        if codebook_sizes.len() != layers {
            return Err(LayoutError::CodebookCountMismatch {
                expected: layers,
                actual: codebook_sizes.len(),
            });
        }
        if let Some(layer) = codebook_sizes.iter().position(|&c| c == 0) {
            return Err(LayoutError::ZeroCodebook { layer });
        }

        let slot_offsets: Vec<u32> = match offsets {
            OffsetTable::PerLayer(per_layer) => {
                if per_layer.len() != layers {
                    return Err(LayoutError::OffsetCountMismatch {
                        expected: layers,
                        actual: per_layer.len(),
                    });
                }
                slots.iter().map(|s| per_layer[s.layer]).collect()
            }
            OffsetTable::PerSlot(per_slot) => {
                if per_slot.len() != frame_size {
                    return Err(LayoutError::OffsetCountMismatch {
                        expected: frame_size,
                        actual: per_slot.len(),
                    });
                }
                per_slot
            }
        };

        // Every slot's id range must be representable as u32 token ids.
        let mut ranges = Vec::with_capacity(frame_size);
        for (slot, (s, &offset)) in slots.iter().zip(&slot_offsets).enumerate() {
            let start = audio_token_base as u64 + offset as u64;
            let end = start + codebook_sizes[s.layer] as u64;
            if end > u32::MAX as u64 + 1 {
                return Err(LayoutError::OffsetOverflow { slot });
            }
            ranges.push(start..end);
        }

        for first in 0..frame_size {
            for second in first + 1..frame_size {
                let (a, b) = (&ranges[first], &ranges[second]);
                let (first_layer, second_layer) = (slots[first].layer, slots[second].layer);
                if first_layer != second_layer && a.start < b.end && b.start < a.end {
                    return Err(LayoutError::OverlappingRanges {
                        first,
                        first_layer,
                        second,
                        second_layer,
                    });
                }
            }
        }

        let mut table: Vec<Vec<u32>> = layer_ratio.iter().map(|&r| vec![0; r]).collect();
        for (s, range) in slots.iter().zip(&ranges) {
            table[s.layer][s.position] = range.start as u32;
        }

        Ok(Self {
            name,
            layer_ratio,
            slots,
            offsets: table,
            codebook_sizes,
            audio_token_base,
        })
    }

    /// Parse and validate a layout from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: LayoutSpec = serde_json::from_str(json).context("Failed to parse frame layout")?;
        Ok(Self::new(spec)?)
    }

    /// Load and validate a layout JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read frame layout: {}", path.display()))?;
        let layout = Self::from_json(&json)
            .with_context(|| format!("Invalid frame layout: {}", path.display()))?;
        tracing::info!(
            "Loaded frame layout '{}' ({} tokens/frame, ratio {:?})",
            layout.name,
            layout.frame_size(),
            layout.layer_ratio
        );
        Ok(layout)
    }

    /// Layout of Orpheus 3B output for the SNAC 24kHz codec.
    ///
    /// Seven tokens per frame in the order `[L0, L1, L2, L2, L1, L2, L2]`.
    /// Every slot owns its own 4096-wide id range starting at
    /// `128266 + slot * 4096`.
    pub fn orpheus_snac_24khz() -> Self {
        let spec = LayoutSpec {
            name: "orpheus-snac-24khz".to_string(),
            layer_ratio: vec![1, 2, 4],
            interleave: vec![0, 1, 2, 2, 1, 2, 2],
            audio_token_base: ORPHEUS_AUDIO_TOKEN_BASE,
            offsets: OffsetTable::PerSlot((0..7).map(|slot| slot * SNAC_CODEBOOK_SIZE).collect()),
            codebook_sizes: vec![SNAC_CODEBOOK_SIZE; 3],
        };
        match Self::new(spec) {
            Ok(layout) => layout,
            Err(e) => unreachable!("built-in Orpheus layout is invalid: {e}"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total tokens in one frame across all layers.
    pub fn frame_size(&self) -> usize {
        self.slots.len()
    }

    pub fn num_layers(&self) -> usize {
        self.layer_ratio.len()
    }

    /// Tokens per frame for each layer.
    pub fn layer_ratio(&self) -> &[usize] {
        &self.layer_ratio
    }

    /// Slot table in raw frame order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn codebook_size(&self, layer: usize) -> Option<u32> {
        self.codebook_sizes.get(layer).copied()
    }

    pub fn audio_token_base(&self) -> u32 {
        self.audio_token_base
    }

    /// Absolute offset (base included) for a layer position.
    pub fn offset(&self, layer: usize, position: usize) -> Option<u32> {
        self.offsets.get(layer)?.get(position).copied()
    }

    /// Raw token ids accepted at a layer position.
    pub fn raw_range(&self, layer: usize, position: usize) -> Option<Range<u64>> {
        let start = self.offset(layer, position)? as u64;
        let size = self.codebook_size(layer)? as u64;
        Some(start..start + size)
    }
}

/// First id of Orpheus' audio vocabulary (`<custom_token_10>`).
pub const ORPHEUS_AUDIO_TOKEN_BASE: u32 = 128_266;

/// Codebook size of every SNAC 24kHz quantizer level.
pub const SNAC_CODEBOOK_SIZE: u32 = 4096;
