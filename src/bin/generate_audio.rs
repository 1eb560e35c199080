//! CLI tool for generating speech with Orpheus and SNAC
//!
//! Usage:
//!     cargo run --features cli --bin generate_audio -- \
//!         --model-dir models/orpheus --snac-dir models/snac --text "Hello" --seed 42
//!
//! Decode a previously dumped token stream without loading the generator:
//!     cargo run --features cli --bin generate_audio -- \
//!         --snac-dir models/snac --tokens out/tokens.json --output replay.wav

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use orpheus_tts::{
    check_layout_matches_codec, device_info, parse_device, AudioBuffer, FrameLayout,
    FramePipeline, OrpheusGenerator, SnacDecoder, SpeechGenerator, SynthesisOptions, Synthesizer,
};

/// Generate speech with a fixed seed
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text to synthesize
    #[arg(short, long, default_value = "Hello")]
    text: String,

    /// Voice name prefixed to the prompt
    #[arg(short, long, default_value = "tara")]
    voice: String,

    /// Random seed for reproducible generation
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Sampling temperature (below 0.01 means greedy)
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,

    /// Top-k sampling parameter (0 = disabled)
    #[arg(long, default_value_t = 50)]
    top_k: usize,

    /// Top-p (nucleus) sampling parameter (1.0 = disabled)
    #[arg(long, default_value_t = 1.0)]
    top_p: f64,

    /// Repetition penalty (1.0 = disabled)
    #[arg(long, default_value_t = 1.1)]
    repetition_penalty: f64,

    /// Maximum number of generated tokens (7 per audio frame)
    #[arg(long, default_value_t = 1024)]
    max_new_tokens: usize,

    /// Generator directory with config.json and safetensors weights
    #[arg(short, long, default_value = "test_data/orpheus")]
    model_dir: String,

    /// SNAC directory with config.json and weights
    #[arg(long, default_value = "test_data/snac_24khz")]
    snac_dir: String,

    /// Tokenizer directory or file (defaults to model_dir)
    #[arg(long)]
    tokenizer_dir: Option<String>,

    /// JSON frame layout file (defaults to the built-in Orpheus layout)
    #[arg(long)]
    layout: Option<String>,

    /// Decode this JSON array of raw token ids instead of generating
    #[arg(long)]
    tokens: Option<String>,

    /// Write the generated audio token stream and run metadata next to the WAV
    #[arg(long)]
    dump_tokens: bool,

    /// Restrict sampling to audio tokens and speech markers
    #[arg(long)]
    restrict_audio: bool,

    /// Output WAV file path
    #[arg(short, long, default_value = "output.wav")]
    output: String,

    /// Device for inference (auto, cpu, cuda, cuda:N, metal)
    #[arg(long, default_value = "auto")]
    device: String,
}

/// Metadata written alongside the audio with `--dump-tokens`
#[derive(Debug, Serialize, Deserialize)]
struct GenerationMetadata {
    text: String,
    voice: String,
    seed: u64,
    temperature: f64,
    top_k: usize,
    top_p: f64,
    repetition_penalty: f64,
    layout: String,
    num_tokens: usize,
    num_frames: usize,
    audio_samples: usize,
    sample_rate: u32,
    generation_ms: f64,
    decode_ms: f64,
}

fn load_layout(path: Option<&str>) -> Result<FrameLayout> {
    match path {
        Some(path) => FrameLayout::load(path),
        None => Ok(FrameLayout::orpheus_snac_24khz()),
    }
}

fn load_tokens(path: &Path) -> Result<Vec<u32>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of token ids", path.display()))
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(120));
    Ok(progress)
}

fn save_audio(audio: &AudioBuffer, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    audio.save(output)?;
    println!(
        "Saved {:.2}s of audio ({} samples @ {} Hz) to {}",
        audio.duration(),
        audio.len(),
        audio.sample_rate,
        output.display()
    );
    Ok(())
}

/// `--tokens` path: only SNAC and the frame layout are loaded.
fn run_replay(args: &Args, tokens_path: &str) -> Result<()> {
    let device = parse_device(&args.device)?;
    println!("Device: {}", device_info(&device));

    let layout = load_layout(args.layout.as_deref())?;
    let codec = SnacDecoder::from_pretrained(&args.snac_dir, &device)?;
    check_layout_matches_codec(&layout, codec.config())?;

    let tokens = load_tokens(Path::new(tokens_path))?;
    println!("Decoding {} tokens with layout '{}'", tokens.len(), layout.name());

    let pipeline = FramePipeline::new(Arc::new(layout));
    let audio = pipeline.synthesize_tokens(&codec, &tokens)?;
    save_audio(&audio, Path::new(&args.output))
}

fn run_generate(args: &Args) -> Result<()> {
    println!("=== Generating Audio ===");
    println!("Text: {}", args.text);
    println!("Voice: {}", args.voice);
    println!("Seed: {}", args.seed);

    let device = parse_device(&args.device)?;
    println!("Device: {}", device_info(&device));

    let layout = load_layout(args.layout.as_deref())?;

    let progress = spinner("Loading models...")?;
    let codec = SnacDecoder::from_pretrained(&args.snac_dir, &device)?;
    check_layout_matches_codec(&layout, codec.config())?;
    let mut generator = OrpheusGenerator::from_pretrained(
        Path::new(&args.model_dir),
        args.tokenizer_dir.as_deref().map(Path::new),
        &device,
    )?;
    if args.restrict_audio {
        generator = generator.with_audio_mask(&layout);
    }
    let tts = Synthesizer::new(generator, codec, Arc::new(layout));
    progress.finish_with_message("Models loaded");

    let options = SynthesisOptions {
        max_new_tokens: args.max_new_tokens,
        temperature: args.temperature,
        top_k: args.top_k,
        top_p: args.top_p,
        repetition_penalty: args.repetition_penalty,
        seed: Some(args.seed),
    };

    let progress = spinner("Generating tokens...")?;
    let start = Instant::now();
    let tokens = tts
        .generator()
        .generate(&args.text, Some(&args.voice), &options)?;
    let generation_ms = start.elapsed().as_secs_f64() * 1000.0;
    progress.finish_with_message(format!("Generated {} audio tokens", tokens.len()));

    let num_frames = tokens.len() / tts.layout().frame_size();

    let start = Instant::now();
    let audio = tts.synthesize_tokens(&tokens)?;
    let decode_ms = start.elapsed().as_secs_f64() * 1000.0;
    println!(
        "Generation: {:.0} ms, decode: {:.0} ms, {} frames",
        generation_ms, decode_ms, num_frames
    );

    let output = PathBuf::from(&args.output);
    save_audio(&audio, &output)?;

    if args.dump_tokens {
        let tokens_path = output.with_extension("tokens.json");
        fs::write(&tokens_path, serde_json::to_string(&tokens)?)?;

        let metadata = GenerationMetadata {
            text: args.text.clone(),
            voice: args.voice.clone(),
            seed: args.seed,
            temperature: args.temperature,
            top_k: args.top_k,
            top_p: args.top_p,
            repetition_penalty: args.repetition_penalty,
            layout: tts.layout().name().to_string(),
            num_tokens: tokens.len(),
            num_frames,
            audio_samples: audio.len(),
            sample_rate: audio.sample_rate,
            generation_ms,
            decode_ms,
        };
        let metadata_path = output.with_extension("json");
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
        println!(
            "Saved tokens to {} and metadata to {}",
            tokens_path.display(),
            metadata_path.display()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.tokens.as_deref() {
        Some(tokens_path) => run_replay(&args, tokens_path),
        None => run_generate(&args),
    }
}
