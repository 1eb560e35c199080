//! Text tokenizer wrapper for the Llama-3 tokenizer used by Orpheus

use anyhow::{anyhow, Result};
use std::path::Path;
use tokenizers::Tokenizer;

/// Token ids framing a text prompt for the speech generator.
///
/// Orpheus expects `[start_of_human] BOS "{voice}: {text}" [end_of_text,
/// end_of_human]`. Markers left as `None` are omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFormat {
    pub start_of_human: Option<u32>,
    pub end_of_text: Option<u32>,
    pub end_of_human: Option<u32>,
    /// Prepend the tokenizer's BOS token before the text
    pub add_bos: bool,
}

impl PromptFormat {
    pub const fn orpheus() -> Self {
        Self {
            start_of_human: Some(128_259),
            end_of_text: Some(128_009),
            end_of_human: Some(128_260),
            add_bos: true,
        }
    }
}

impl Default for PromptFormat {
    fn default() -> Self {
        Self::orpheus()
    }
}

/// Text tokenizer wrapping HuggingFace tokenizers
#[derive(Debug)]
pub struct TextTokenizer {
    tokenizer: Tokenizer,
    /// `<|begin_of_text|>` if the vocabulary has it
    pub bos_token_id: Option<u32>,
    /// `<|eot_id|>` if the vocabulary has it
    pub eos_token_id: Option<u32>,
}

impl TextTokenizer {
    /// Load tokenizer from a local path or HuggingFace model ID.
    ///
    /// Resolution order:
    /// 1. Direct file path to `tokenizer.json`
    /// 2. Directory containing `tokenizer.json`
    /// 3. HuggingFace Hub download (if `hub` feature enabled)
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        let path = Path::new(model_id);

        if path.is_file() {
            return Self::from_file(path);
        }

        if path.join("tokenizer.json").exists() {
            return Self::from_file(path.join("tokenizer.json"));
        }

        if path.is_dir() {
            anyhow::bail!(
                "No tokenizer files found in '{}'. Expected tokenizer.json.",
                model_id
            );
        }

        #[cfg(feature = "hub")]
        {
            tracing::info!("Downloading tokenizer from HuggingFace Hub: {}", model_id);
            let api = hf_hub::api::sync::Api::new()
                .map_err(|e| anyhow!("Failed to create HuggingFace API: {}", e))?;
            let file = api
                .model(model_id.to_string())
                .get("tokenizer.json")
                .map_err(|e| anyhow!("Failed to download tokenizer from '{}': {}", model_id, e))?;
            Self::from_file(&file)
        }

        #[cfg(not(feature = "hub"))]
        Err(anyhow!(
            "No tokenizer found at '{}' and hub feature is disabled",
            model_id
        ))
    }

    /// Load tokenizer from a local file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;

        Ok(Self::from_tokenizer(tokenizer))
    }

    /// Create from a tokenizers::Tokenizer instance
    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        let bos_token_id = tokenizer.token_to_id("<|begin_of_text|>");
        let eos_token_id = tokenizer.token_to_id("<|eot_id|>");
        Self {
            tokenizer,
            bos_token_id,
            eos_token_id,
        }
    }

    /// Encode text to token IDs, without special tokens
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("Failed to encode text: {}", e))?;

        Ok(encoding.get_ids().to_vec())
    }

    /// Build the generator prompt for `text` spoken by `voice`.
    ///
    /// With a voice the text becomes `"{voice}: {text}"`; without one it is
    /// used unchanged.
    pub fn build_prompt(
        &self,
        text: &str,
        voice: Option<&str>,
        format: &PromptFormat,
    ) -> Result<Vec<u32>> {
        let prompt_text = match voice {
            Some(v) if !v.is_empty() => format!("{v}: {text}"),
            _ => text.to_string(),
        };

        let mut ids = Vec::new();
        ids.extend(format.start_of_human);
        if format.add_bos {
            ids.extend(self.bos_token_id);
        }
        ids.extend(self.encode(&prompt_text)?);
        ids.extend(format.end_of_text);
        ids.extend(format.end_of_human);
        Ok(ids)
    }

    /// Decode token IDs back to text
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| anyhow!("Failed to decode tokens: {}", e))
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    pub fn id_to_token(&self, id: u32) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }
}

#[cfg(test)]
pub(crate) const MOCK_TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "<|begin_of_text|>": 0,
      "<|eot_id|>": 1,
      "[UNK]": 2,
      "tara": 3,
      ":": 4,
      "hello": 5,
      "world": 6
    },
    "unk_token": "[UNK]"
  }
}"#;
