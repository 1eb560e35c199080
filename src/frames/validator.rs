//! Splitting a token stream into whole frames and an undecodable tail.

use super::layout::FrameLayout;

/// A token stream cut at its last complete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSplit<'a> {
    /// Whole frames; length is a multiple of the frame size.
    pub frames: &'a [u32],
    /// Leftover tokens of an unfinished frame, shorter than one frame.
    pub tail: &'a [u32],
}

impl FrameSplit<'_> {
    pub fn num_frames(&self, frame_size: usize) -> usize {
        self.frames.len() / frame_size
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameLayout {
    /// Split `stream` into its complete frames and the trailing partial frame.
    ///
    /// A non-empty tail means the generator stopped mid-frame; it is logged
    /// and left out of decoding. Zero complete frames is not an error here.
    pub fn validate<'a>(&self, stream: &'a [u32]) -> FrameSplit<'a> {
        let frame_size = self.frame_size();
        let usable = stream.len() - stream.len() % frame_size;
        let (frames, tail) = stream.split_at(usable);

        if !tail.is_empty() {
            tracing::warn!(
                tail = tail.len(),
                frames = usable / frame_size,
                "token stream ends mid-frame, dropping tail"
            );
        }

        FrameSplit { frames, tail }
    }
}
