//! Raw generator ids to codec-layer indices.

use super::layout::{FrameLayout, Slot};
use crate::error::SynthesisError;

impl FrameLayout {
    /// Map a raw generator token to an index into one layer's codebook.
    ///
    /// `position_in_layer` selects the offset when a layer's positions use
    /// different id ranges (Orpheus gives every frame slot its own range).
    pub fn map_token(
        &self,
        raw_id: u32,
        layer_index: usize,
        position_in_layer: usize,
    ) -> Result<u32, SynthesisError> {
        let ratio = *self
            .layer_ratio()
            .get(layer_index)
            .ok_or(SynthesisError::UnknownLayer {
                layer: layer_index,
                layers: self.num_layers(),
            })?;
        let range = self
            .raw_range(layer_index, position_in_layer)
            .ok_or(SynthesisError::UnknownPosition {
                layer: layer_index,
                position: position_in_layer,
                ratio,
            })?;

        if !range.contains(&(raw_id as u64)) {
            return Err(SynthesisError::OutOfRangeToken {
                raw_id,
                layer: layer_index,
                position: position_in_layer,
                range,
            });
        }
        Ok((raw_id as u64 - range.start) as u32)
    }

    /// Inverse of [`map_token`](Self::map_token): layer index back to a raw id.
    pub fn unmap_token(
        &self,
        code: u32,
        layer_index: usize,
        position_in_layer: usize,
    ) -> Result<u32, SynthesisError> {
        let ratio = *self
            .layer_ratio()
            .get(layer_index)
            .ok_or(SynthesisError::UnknownLayer {
                layer: layer_index,
                layers: self.num_layers(),
            })?;
        let range = self
            .raw_range(layer_index, position_in_layer)
            .ok_or(SynthesisError::UnknownPosition {
                layer: layer_index,
                position: position_in_layer,
                ratio,
            })?;
        let raw = range.start + code as u64;
        if raw >= range.end {
            return Err(SynthesisError::CodeOutOfRange {
                code,
                layer: layer_index,
                position: position_in_layer,
                codebook_size: range.end - range.start,
            });
        }
        Ok(raw as u32)
    }

    /// Which slot's id range a raw token falls in, if any.
    ///
    /// Useful when diagnosing a misaligned stream: a token that maps cleanly
    /// but under a different slot than the one it arrived in means the
    /// stream lost or gained tokens upstream.
    pub fn lookup_slot(&self, raw_id: u32) -> Option<Slot> {
        self.slots().iter().copied().find(|s| {
            self.raw_range(s.layer, s.position)
                .is_some_and(|r| r.contains(&(raw_id as u64)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::layout::{LayoutSpec, OffsetTable};

    fn layout() -> FrameLayout {
        FrameLayout::new(LayoutSpec {
            name: "test".to_string(),
            layer_ratio: vec![1, 2, 4],
            interleave: vec![0, 1, 2, 2, 1, 2, 2],
            audio_token_base: 0,
            offsets: OffsetTable::PerLayer(vec![0, 4096, 8192]),
            codebook_sizes: vec![4096, 4096, 4096],
        })
        .unwrap()
    }

    #[test]
    fn test_map_token_subtracts_layer_offset() {
        let layout = layout();
        assert_eq!(layout.map_token(10, 0, 0).unwrap(), 10);
        assert_eq!(layout.map_token(4100, 1, 0).unwrap(), 4);
        assert_eq!(layout.map_token(4101, 1, 1).unwrap(), 5);
        assert_eq!(layout.map_token(8203, 2, 3).unwrap(), 11);
    }

    #[test]
    fn test_map_token_range_edges() {
        let layout = layout();
        assert_eq!(layout.map_token(4096, 1, 0).unwrap(), 0);
        assert_eq!(layout.map_token(8191, 1, 0).unwrap(), 4095);
        assert!(matches!(
            layout.map_token(8192, 1, 0),
            Err(SynthesisError::OutOfRangeToken { raw_id: 8192, layer: 1, .. })
        ));
        // below the offset is a negative index
        assert!(matches!(
            layout.map_token(4095, 1, 0),
            Err(SynthesisError::OutOfRangeToken { .. })
        ));
    }

    #[test]
    fn test_map_token_reports_expected_range() {
        let layout = layout();
        match layout.map_token(9000, 0, 0) {
            Err(SynthesisError::OutOfRangeToken { range, .. }) => assert_eq!(range, 0..4096),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_layer_and_position() {
        let layout = layout();
        assert!(matches!(
            layout.map_token(0, 3, 0),
            Err(SynthesisError::UnknownLayer { layer: 3, layers: 3 })
        ));
        assert!(matches!(
            layout.map_token(4096, 1, 2),
            Err(SynthesisError::UnknownPosition {
                layer: 1,
                position: 2,
                ratio: 2
            })
        ));
    }

    #[test]
    fn test_orpheus_slot_offsets() {
        let layout = FrameLayout::orpheus_snac_24khz();
        // slot 4 (layer 1, position 1) starts at base + 4 * 4096
        let raw = 128_266 + 4 * 4096 + 17;
        assert_eq!(layout.map_token(raw, 1, 1).unwrap(), 17);
        assert!(layout.map_token(raw, 1, 0).is_err());
        // end-of-speech marker is not an audio token
        assert!(layout.map_token(128_258, 0, 0).is_err());
    }

    #[test]
    fn test_unmap_inverts_map() {
        let layout = FrameLayout::orpheus_snac_24khz();
        for slot in layout.slots() {
            let raw = layout.unmap_token(1234, slot.layer, slot.position).unwrap();
            assert_eq!(layout.map_token(raw, slot.layer, slot.position).unwrap(), 1234);
        }
        match layout.unmap_token(4096, 0, 0) {
            Err(SynthesisError::CodeOutOfRange {
                code,
                codebook_size,
                ..
            }) => {
                assert_eq!(code, 4096);
                assert_eq!(codebook_size, 4096);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_lookup_slot() {
        let layout = FrameLayout::orpheus_snac_24khz();
        assert_eq!(
            layout.lookup_slot(128_266 + 3 * 4096),
            Some(Slot {
                layer: 2,
                position: 1
            })
        );
        assert_eq!(layout.lookup_slot(128_257), None);
    }
}
