//! HuggingFace Hub integration for downloading Orpheus and SNAC checkpoints.
//!
//! Enable with the `hub` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use orpheus_tts::hub::ModelPaths;
//!
//! let paths = ModelPaths::download(None)?;
//! let tts = OrpheusTTS::from_paths(&paths, None, device)?;
//! ```

use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiRepo};
use std::path::{Path, PathBuf};

/// Default HuggingFace model IDs.
pub mod model_ids {
    /// Orpheus 3B, fine-tuned on the preset voices
    pub const ORPHEUS: &str = "canopylabs/orpheus-3b-0.1-ft";

    /// SNAC 24kHz speech codec
    pub const SNAC: &str = "hubertsiuzdak/snac_24khz";
}

/// Local snapshot directories of the downloaded checkpoints.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    /// Generator weights, `config.json` and `tokenizer.json`
    pub model_dir: PathBuf,
    /// SNAC `config.json` and weights
    pub snac_dir: PathBuf,
}

impl ModelPaths {
    /// Download both checkpoints into the HuggingFace cache.
    ///
    /// `model_id` overrides the generator repository.
    pub fn download(model_id: Option<&str>) -> Result<Self> {
        let api = Api::new().context("Failed to create HuggingFace API")?;
        let model_id = model_id.unwrap_or(model_ids::ORPHEUS);

        tracing::info!("Downloading generator: {}", model_id);
        let model_dir = download_generator(&api.model(model_id.to_string()))?;

        tracing::info!("Downloading codec: {}", model_ids::SNAC);
        let snac_dir = download_snac(&api.model(model_ids::SNAC.to_string()))?;

        tracing::info!("Download complete!");
        Ok(Self {
            model_dir,
            snac_dir,
        })
    }
}

fn snapshot_dir(file: &Path) -> Result<PathBuf> {
    file.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("No parent directory for {}", file.display()))
}

fn download_generator(repo: &ApiRepo) -> Result<PathBuf> {
    let config = repo
        .get("config.json")
        .context("Failed to download config.json")?;
    repo.get("tokenizer.json")
        .context("Failed to download tokenizer.json")?;

    match repo.get("model.safetensors.index.json") {
        Ok(index) => {
            for shard in shard_names(&index)? {
                tracing::info!("  {}", shard);
                repo.get(&shard)
                    .with_context(|| format!("Failed to download {shard}"))?;
            }
        }
        Err(_) => {
            repo.get("model.safetensors")
                .context("Failed to download model.safetensors")?;
        }
    }
    snapshot_dir(&config)
}

fn download_snac(repo: &ApiRepo) -> Result<PathBuf> {
    let config = repo
        .get("config.json")
        .context("Failed to download SNAC config.json")?;
    if repo.get("model.safetensors").is_err() {
        repo.get("pytorch_model.bin")
            .context("Failed to download SNAC weights")?;
    }
    snapshot_dir(&config)
}

/// Unique shard file names listed in a safetensors index.
fn shard_names(index_path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(index_path)
        .with_context(|| format!("Failed to read {}", index_path.display()))?;
    let index: serde_json::Value = serde_json::from_str(&content)?;
    let mut names: Vec<String> = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .context("No weight_map in safetensors index")?
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}
