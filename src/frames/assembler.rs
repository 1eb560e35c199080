//! Assembling per-frame layer slices into whole-utterance layer sequences.

use super::layout::FrameLayout;
use crate::error::SynthesisError;

/// Codebook indices of one layer across every frame, in frame order.
pub type LayerSequence = Vec<u32>;

impl FrameLayout {
    /// Demultiplex every frame of `frame_group` and concatenate per layer.
    ///
    /// The result has one sequence per layer, ordered as the codec takes
    /// them; sequence `i` holds `num_frames * layer_ratio[i]` codes.
    pub fn assemble(&self, frame_group: &[u32]) -> Result<Vec<LayerSequence>, SynthesisError> {
        let frame_size = self.frame_size();
        if frame_group.is_empty() {
            return Err(SynthesisError::EmptyFrameGroup);
        }
        let num_frames = frame_group.len() / frame_size;
        let trailing = frame_group.len() % frame_size;
        if trailing != 0 {
            // Reported against the incomplete last frame.
            return Err(SynthesisError::FrameSizeMismatch {
                expected: frame_size,
                actual: trailing,
            }
            .in_frame(num_frames));
        }

        let mut layers: Vec<LayerSequence> = self
            .layer_ratio()
            .iter()
            .map(|&r| Vec::with_capacity(num_frames * r))
            .collect();

        for (frame, chunk) in frame_group.chunks_exact(frame_size).enumerate() {
            self.demux_frame_into(chunk, &mut layers)
                .map_err(|e| e.in_frame(frame))?;
        }

        tracing::debug!(
            frames = num_frames,
            lengths = ?layers.iter().map(Vec::len).collect::<Vec<_>>(),
            "assembled layer sequences"
        );
        Ok(layers)
    }

    /// Re-encode layer sequences into the generator's flat raw-id stream.
    ///
    /// This is the exact inverse of [`assemble`](Self::assemble).
    pub fn interleave(&self, layers: &[LayerSequence]) -> Result<Vec<u32>, SynthesisError> {
        let num_frames = self.frame_count(layers)?;
        let mut stream = Vec::with_capacity(num_frames * self.frame_size());
        for frame in 0..num_frames {
            for slot in self.slots() {
                let ratio = self.layer_ratio()[slot.layer];
                let code = layers[slot.layer][frame * ratio + slot.position];
                let raw = self
                    .unmap_token(code, slot.layer, slot.position)
                    .map_err(|e| e.in_frame(frame))?;
                stream.push(raw);
            }
        }
        Ok(stream)
    }

    /// Common frame count of a set of layer sequences.
    ///
    /// Checks there is one sequence per layer and that every sequence is
    /// `num_frames * layer_ratio[i]` long, with `num_frames` taken from the
    /// first layer.
    pub fn frame_count(&self, layers: &[LayerSequence]) -> Result<usize, SynthesisError> {
        let ratio = self.layer_ratio();
        if layers.len() != ratio.len() {
            return Err(SynthesisError::LayerLengthMismatch {
                layer: layers.len().min(ratio.len()),
                expected: ratio.len(),
                actual: layers.len(),
            });
        }

        let num_frames = layers[0].len() / ratio[0];
        for (layer, (codes, &r)) in layers.iter().zip(ratio).enumerate() {
            let expected = num_frames * r;
            if codes.len() != expected {
                return Err(SynthesisError::LayerLengthMismatch {
                    layer,
                    expected,
                    actual: codes.len(),
                });
            }
        }
        if num_frames == 0 {
            return Err(SynthesisError::EmptyFrameGroup);
        }
        Ok(num_frames)
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
    fn test_assemble_two_frames_in_order() {
        let layout = layout();
        let stream = [
            10, 4100, 8200, 8201, 4101, 8202, 8203, // frame 0
            20, 4110, 8210, 8211, 4111, 8212, 8213, // frame 1
        ];
        let layers = layout.assemble(&stream).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], vec![10, 20]);
        assert_eq!(layers[1], vec![4, 5, 14, 15]);
        assert_eq!(layers[2], vec![8, 9, 10, 11, 18, 19, 20, 21]);
    }

    #[test]
    fn test_assemble_lengths_follow_ratio() {
        let layout = FrameLayout::orpheus_snac_24khz();
        let frames = 5;
        let stream: Vec<u32> = (0..frames)
            .flat_map(|f| {
                layout
                    .slots()
                    .iter()
                    .enumerate()
                    .map(move |(slot, _)| 128_266 + slot as u32 * 4096 + f as u32)
            })
            .collect();
        let layers = layout.assemble(&stream).unwrap();
        for (codes, &r) in layers.iter().zip(layout.layer_ratio()) {
            assert_eq!(codes.len(), frames * r);
        }
    }

    #[test]
    fn test_assemble_empty() {
        let layout = layout();
        assert!(matches!(
            layout.assemble(&[]),
            Err(SynthesisError::EmptyFrameGroup)
        ));
    }

    #[test]
    fn test_assemble_partial_frame_rejected() {
        let layout = layout();
        let err = layout
            .assemble(&[10, 4100, 8200, 8201, 4101, 8202, 8203, 1])
            .unwrap_err();
        match &err {
            SynthesisError::InFrame { frame, source } => {
                assert_eq!(*frame, 1);
                assert!(matches!(
                    **source,
                    SynthesisError::FrameSizeMismatch {
                        expected: 7,
                        actual: 1
                    }
                ));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(err.to_string(), "frame 1: frame has 1 tokens, expected 7");
    }

    #[test]
    fn test_assemble_error_names_frame() {
        let layout = layout();
        let stream = [
            10, 4100, 8200, 8201, 4101, 8202, 8203, //
            10, 4100, 8200, 8201, 4101, 8202, 50000,
        ];
        let err = layout.assemble(&stream).unwrap_err();
        match &err {
            SynthesisError::InFrame { frame, source } => {
                assert_eq!(*frame, 1);
                assert!(matches!(
                    **source,
                    SynthesisError::OutOfRangeToken { raw_id: 50000, .. }
                ));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(err.kind(), "out_of_range_token");
    }

    #[test]
    fn test_interleave_round_trip() {
        let layout = FrameLayout::orpheus_snac_24khz();
        let layers = vec![
            vec![1, 4095],
            vec![2, 3, 0, 17],
            vec![4, 5, 6, 7, 100, 200, 300, 400],
        ];
        let stream = layout.interleave(&layers).unwrap();
        assert_eq!(stream.len(), 14);
        assert_eq!(layout.assemble(&stream).unwrap(), layers);
    }

    #[test]
    fn test_interleave_rejects_bad_shapes_and_codes() {
        let layout = layout();
        assert!(matches!(
            layout.interleave(&[vec![1], vec![2], vec![3, 4, 5, 6]]),
            Err(SynthesisError::LayerLengthMismatch { layer: 1, .. })
        ));
        let err = layout
            .interleave(&[vec![4096], vec![0, 0], vec![0, 0, 0, 0]])
            .unwrap_err();
        assert!(matches!(
            err.root(),
            SynthesisError::CodeOutOfRange {
                code: 4096,
                layer: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_frame_count() {
        let layout = layout();
        assert_eq!(
            layout
                .frame_count(&[vec![0; 3], vec![0; 6], vec![0; 12]])
                .unwrap(),
            3
        );
        assert!(matches!(
            layout.frame_count(&[vec![], vec![], vec![]]),
            Err(SynthesisError::EmptyFrameGroup)
        ));
        assert!(matches!(
            layout.frame_count(&[vec![0; 3], vec![0; 6]]),
            Err(SynthesisError::LayerLengthMismatch { .. })
        ));
    }
}
