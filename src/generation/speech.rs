//! Speech segment handling for Orpheus-style generators
//!
//! The language model brackets its audio tokens with marker tokens. Only the
//! ids after the last start-of-speech marker are audio; end-of-speech ends
//! the segment. An optional [`AudioTokenMask`] keeps sampling inside the
//! audio range.

use crate::frames::FrameLayout;

/// Marker ids around the audio segment of a generated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechMarkers {
    pub start_of_speech: u32,
    pub end_of_speech: u32,
    pub start_of_ai: u32,
    pub end_of_ai: u32,
}

impl SpeechMarkers {
    /// Marker ids of the Orpheus 3B checkpoints.
    pub const fn orpheus() -> Self {
        Self {
            start_of_speech: 128_257,
            end_of_speech: 128_258,
            start_of_ai: 128_261,
            end_of_ai: 128_262,
        }
    }

    /// Tokens that end generation.
    pub fn stop_tokens(&self) -> Vec<u32> {
        vec![self.end_of_speech, self.end_of_ai]
    }
}

impl Default for SpeechMarkers {
    fn default() -> Self {
        Self::orpheus()
    }
}

/// Cut the raw audio token stream out of a generated sequence.
///
/// Keeps everything after the last start-of-speech marker (or the whole
/// sequence if there is none) up to the first end-of-speech marker. No
/// range checks happen here; ids that are not audio tokens are reported
/// later by the frame pipeline.
pub fn extract_speech_tokens(generated: &[u32], markers: &SpeechMarkers) -> Vec<u32> {
    let start = generated
        .iter()
        .rposition(|&t| t == markers.start_of_speech)
        .map(|i| i + 1)
        .unwrap_or(0);

    generated[start..]
        .iter()
        .copied()
        .take_while(|&t| t != markers.end_of_speech)
        .collect()
}

/// Pre-computed logit mask restricting sampling to audio tokens and markers.
///
/// Build once per generator with [`AudioTokenMask::new`], then apply to each
/// row of logits before sampling.
#[derive(Debug, Clone)]
pub struct AudioTokenMask {
    /// true at ids that must not be sampled
    suppressed: Vec<bool>,
}

impl AudioTokenMask {
    /// Allow every raw id the layout accepts in any slot, plus the speech
    /// markers. Everything else in `vocab_size` is suppressed.
    pub fn new(vocab_size: usize, layout: &FrameLayout, markers: &SpeechMarkers) -> Self {
        let mut suppressed = vec![true; vocab_size];
        for slot in layout.slots() {
            if let Some(range) = layout.raw_range(slot.layer, slot.position) {
                let end = (range.end as usize).min(vocab_size);
                let start = (range.start as usize).min(end);
                suppressed[start..end].iter_mut().for_each(|s| *s = false);
            }
        }
        for id in [
            markers.start_of_speech,
            markers.end_of_speech,
            markers.start_of_ai,
            markers.end_of_ai,
        ] {
            if let Some(s) = suppressed.get_mut(id as usize) {
                *s = false;
            }
        }
        Self { suppressed }
    }

    /// Set suppressed logits to -inf.
    pub fn apply(&self, logits: &mut [f32]) {
        for (v, &s) in logits.iter_mut().zip(&self.suppressed) {
            if s {
                *v = f32::NEG_INFINITY;
            }
        }
    }

    pub fn is_allowed(&self, id: u32) -> bool {
        !self.suppressed.get(id as usize).copied().unwrap_or(true)
    }
}
