//! Neural network models
//!
//! - `orpheus`: Llama-based generator producing interleaved audio tokens
//! - `snac`: multi-scale codec decoder turning layer codes into audio

pub mod orpheus;
pub mod snac;

pub use orpheus::OrpheusGenerator;
pub use snac::{SnacConfig, SnacDecoder};
