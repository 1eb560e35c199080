//! SNAC multi-scale neural audio codec (decoder side)
//!
//! SNAC quantizes audio latents at several temporal resolutions. The 24kHz
//! speech model has three levels with strides 4, 2 and 1, so one coarse
//! code covers four latent steps (2048 samples) and the finer levels carry
//! two and four codes for the same span.

mod config;
mod decoder;

pub use config::SnacConfig;
pub use decoder::SnacDecoder;
