//! Text tokenization for the speech generator
//!
//! Uses HuggingFace's tokenizers library with the checkpoint's
//! `tokenizer.json`, and frames the prompt with the generator's marker ids.

mod text;

#[cfg(test)]
pub(crate) use text::MOCK_TOKENIZER_JSON;
pub use text::{PromptFormat, TextTokenizer};
