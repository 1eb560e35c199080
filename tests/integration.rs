//! Integration tests for Orpheus TTS
//!
//! These drive the public API with fake generators, fake codecs and a
//! small SNAC decoder built from mock weights.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use orpheus_tts::frames::LayerSequence;
use orpheus_tts::{
    CodecDecoder, FrameLayout, FramePipeline, LayoutSpec, OffsetTable, SpeechGenerator,
    SynthesisError, SynthesisOptions, Synthesizer,
};

/// Three layers at 1/2/4 codes per frame, base 0, per-layer offsets.
fn three_layer_layout() -> FrameLayout {
    FrameLayout::new(LayoutSpec {
        name: "three-layer".to_string(),
        layer_ratio: vec![1, 2, 4],
        interleave: vec![0, 1, 2, 2, 1, 2, 2],
        audio_token_base: 0,
        offsets: OffsetTable::PerLayer(vec![0, 4096, 8192]),
        codebook_sizes: vec![4096, 4096, 4096],
    })
    .unwrap()
}

const FRAME: [u32; 7] = [10, 4100, 8200, 8201, 4101, 8202, 8203];

/// Records every call and returns one second of silence per frame.
#[derive(Default)]
struct RecordingCodec {
    calls: AtomicUsize,
    last: std::sync::Mutex<Vec<LayerSequence>>,
}

impl CodecDecoder for RecordingCodec {
    fn sample_rate(&self) -> u32 {
        16000
    }

    fn decode_layers(&self, layers: &[LayerSequence]) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = layers.to_vec();
        Ok(vec![0.0; layers[0].len() * 16000])
    }
}

struct FixedGenerator(Vec<u32>);

impl SpeechGenerator for FixedGenerator {
    fn generate(&self, _: &str, _: Option<&str>, _: &SynthesisOptions) -> anyhow::Result<Vec<u32>> {
        Ok(self.0.clone())
    }
}

mod frame_pipeline_tests {
    use super::*;

    #[test]
    fn test_single_frame_reaches_codec_demultiplexed() {
        let layout = three_layer_layout();
        let layers = layout.demux_frame(&FRAME).unwrap();
        assert_eq!(layers, vec![vec![10], vec![4, 5], vec![8, 9, 10, 11]]);

        let codec = RecordingCodec::default();
        let pipeline = FramePipeline::new(Arc::new(layout));
        let audio = pipeline.synthesize_tokens(&codec, &FRAME).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert!((audio.duration() - 1.0).abs() < 1e-6);
        assert_eq!(
            *codec.last.lock().unwrap(),
            vec![vec![10], vec![4, 5], vec![8, 9, 10, 11]]
        );
    }

    #[test]
    fn test_token_outside_layer_range() {
        let layout = three_layer_layout();
        let mut frame = FRAME;
        frame[0] = 9000;
        let err = layout.demux_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::OutOfRangeToken {
                raw_id: 9000,
                layer: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_last_token_yields_no_audio() {
        let codec = RecordingCodec::default();
        let pipeline = FramePipeline::new(Arc::new(three_layer_layout()));

        let mut stream = FRAME.repeat(3);
        if let Some(last) = stream.last_mut() {
            *last = 50000;
        }
        let err = pipeline.synthesize_tokens(&codec, &stream).unwrap_err();
        assert_eq!(err.kind(), "out_of_range_token");
        assert!(matches!(err, SynthesisError::InFrame { frame: 2, .. }));
        assert_eq!(codec.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_layer_never_reaches_codec() {
        let codec = RecordingCodec::default();
        let layout = three_layer_layout();
        let layers = vec![vec![1, 2], vec![1, 2, 3], vec![0; 8]];
        let err = layout.decode(&codec, &layers).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::LayerLengthMismatch {
                layer: 1,
                expected: 4,
                actual: 3
            }
        ));
        assert_eq!(codec.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stream_length_boundaries() {
        let codec = RecordingCodec::default();
        let pipeline = FramePipeline::new(Arc::new(three_layer_layout()));

        assert!(matches!(
            pipeline.synthesize_tokens(&codec, &[]),
            Err(SynthesisError::EmptyFrameGroup)
        ));
        assert!(matches!(
            pipeline.synthesize_tokens(&codec, &FRAME[..6]),
            Err(SynthesisError::EmptyFrameGroup)
        ));

        let mut stream = FRAME.to_vec();
        stream.extend_from_slice(&FRAME[..2]);
        let audio = pipeline.synthesize_tokens(&codec, &stream).unwrap();
        assert_eq!(audio.len(), 16000);
        assert_eq!(codec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_layout_from_json_file_drives_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(
            &path,
            r#"{
                "name": "two-layer",
                "layer_ratio": [1, 2],
                "interleave": [1, 0, 1],
                "offsets": { "per_layer": [100, 200] },
                "codebook_sizes": [50, 50]
            }"#,
        )
        .unwrap();
        let layout = FrameLayout::load(&path).unwrap();
        assert_eq!(layout.frame_size(), 3);

        let codec = RecordingCodec::default();
        let pipeline = FramePipeline::new(Arc::new(layout));
        pipeline
            .synthesize_tokens(&codec, &[201, 107, 249, 210, 100, 211])
            .unwrap();
        assert_eq!(
            *codec.last.lock().unwrap(),
            vec![vec![7, 0], vec![1, 49, 10, 11]]
        );
    }

    #[test]
    fn test_shipped_layout_file_matches_preset() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("layouts/orpheus_snac_24khz.json");
        let loaded = FrameLayout::load(path).unwrap();
        let preset = FrameLayout::orpheus_snac_24khz();
        assert_eq!(loaded.name(), preset.name());
        assert_eq!(loaded.slots(), preset.slots());
        for slot in preset.slots() {
            assert_eq!(
                loaded.raw_range(slot.layer, slot.position),
                preset.raw_range(slot.layer, slot.position)
            );
        }
    }

    #[test]
    fn test_pipeline_shared_across_threads() {
        let pipeline = Arc::new(FramePipeline::new(Arc::new(three_layer_layout())));
        let codec = Arc::new(RecordingCodec::default());

        let handles: Vec<_> = (1..=4)
            .map(|frames| {
                let pipeline = Arc::clone(&pipeline);
                let codec = Arc::clone(&codec);
                std::thread::spawn(move || {
                    let stream = FRAME.repeat(frames);
                    pipeline
                        .synthesize_tokens(codec.as_ref(), &stream)
                        .unwrap()
                        .len()
                })
            })
            .collect();

        let lengths: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(lengths, vec![16000, 32000, 48000, 64000]);
        assert_eq!(codec.calls.load(Ordering::SeqCst), 4);
    }
}

mod synthesizer_tests {
    use super::*;

    #[test]
    fn test_synthesize_fixed_generator() {
        let tts = Synthesizer::new(
            FixedGenerator(FRAME.repeat(2)),
            RecordingCodec::default(),
            Arc::new(three_layer_layout()),
        );
        let audio = tts.synthesize("hello", Some("tara"), None).unwrap();
        assert_eq!(audio.len(), 32000);
        assert_eq!(tts.layout().name(), "three-layer");
    }

    #[test]
    fn test_synthesize_tokens_bypasses_generator() {
        let tts = Synthesizer::new(
            FixedGenerator(vec![]),
            RecordingCodec::default(),
            Arc::new(three_layer_layout()),
        );
        let audio = tts.synthesize_tokens(&FRAME).unwrap();
        assert_eq!(audio.len(), 16000);
        assert!(matches!(
            tts.synthesize("hello", None, None),
            Err(SynthesisError::EmptyFrameGroup)
        ));
    }

    #[test]
    fn test_error_display_names_frame_and_token() {
        let mut stream = FRAME.to_vec();
        stream.extend_from_slice(&[10, 4100, 8200, 8201, 4101, 8202, 3]);
        let tts = Synthesizer::new(
            FixedGenerator(stream),
            RecordingCodec::default(),
            Arc::new(three_layer_layout()),
        );
        let message = tts.synthesize("hello", None, None).unwrap_err().to_string();
        assert!(message.starts_with("frame 1:"), "{message}");
        assert!(message.contains("token 3"), "{message}");
    }
}

mod snac_tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::{VarBuilder, VarMap};
    use orpheus_tts::{SnacConfig, SnacDecoder};

    fn tiny_config() -> SnacConfig {
        SnacConfig {
            encoder_dim: 2,
            encoder_rates: vec![2, 2],
            decoder_dim: 16,
            decoder_rates: vec![2, 2],
            codebook_size: 32,
            codebook_dim: 4,
            noise: false,
            depthwise: false,
            ..Default::default()
        }
    }

    /// Mock weights: the first build registers every variable, which are
    /// then randomized so weight norm never divides by zero.
    fn tiny_snac(varmap: &VarMap) -> SnacDecoder {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        SnacDecoder::new(tiny_config(), vb).unwrap();
        for (name, var) in varmap.data().lock().unwrap().iter() {
            let value = if name.ends_with("alpha") {
                var.ones_like().unwrap()
            } else {
                Tensor::rand(-0.5f32, 0.5, var.shape(), &Device::Cpu).unwrap()
            };
            var.set(&value).unwrap();
        }
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        SnacDecoder::new(tiny_config(), vb).unwrap()
    }

    fn tiny_layout() -> FrameLayout {
        FrameLayout::new(LayoutSpec {
            name: "tiny-snac".to_string(),
            layer_ratio: vec![1, 2, 4],
            interleave: vec![0, 1, 2, 2, 1, 2, 2],
            audio_token_base: 1000,
            offsets: OffsetTable::PerSlot((0..7).map(|slot| slot * 32).collect()),
            codebook_sizes: vec![32; 3],
        })
        .unwrap()
    }

    #[test]
    fn test_snac_decodes_token_stream() {
        let varmap = VarMap::new();
        let codec = tiny_snac(&varmap);
        let layout = tiny_layout();
        orpheus_tts::check_layout_matches_codec(&layout, codec.config()).unwrap();

        let stream: Vec<u32> = (0..3)
            .flat_map(|frame| {
                (0..7u32).map(move |slot| 1000 + slot * 32 + (frame * 5 + slot) % 32)
            })
            .collect();
        let pipeline = FramePipeline::new(Arc::new(layout));
        let audio = pipeline.synthesize_tokens(&codec, &stream).unwrap();

        // 4 latent steps per frame, upsampled 2 * 2.
        assert_eq!(audio.len(), 3 * 16);
        assert_eq!(audio.sample_rate, 24000);
        assert!(audio.samples.iter().all(|s| s.is_finite() && s.abs() <= 1.0));

        let again = pipeline.synthesize_tokens(&codec, &stream).unwrap();
        assert_eq!(audio.samples, again.samples);
    }

    #[test]
    fn test_snac_rejects_layout_with_larger_codebook() {
        let varmap = VarMap::new();
        let codec = tiny_snac(&varmap);
        let layout = FrameLayout::orpheus_snac_24khz();
        assert!(orpheus_tts::check_layout_matches_codec(&layout, codec.config()).is_err());
    }

    #[test]
    fn test_wav_bytes_of_decoded_audio() {
        let varmap = VarMap::new();
        let codec = tiny_snac(&varmap);
        let pipeline = FramePipeline::new(Arc::new(tiny_layout()));
        let frame: Vec<u32> = (0..7u32).map(|slot| 1000 + slot * 32).collect();
        let audio = pipeline.synthesize_tokens(&codec, &frame).unwrap();

        let bytes = audio.to_wav_bytes().unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        audio.save(&path).unwrap();
        let loaded = orpheus_tts::AudioBuffer::load(&path).unwrap();
        assert_eq!(loaded.sample_rate, 24000);
        assert_eq!(loaded.len(), audio.len());
    }
}
