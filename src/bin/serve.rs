//! HTTP front end for Orpheus TTS
//!
//! Configuration comes from the environment:
//!
//! | Variable          | Default   |
//! |-------------------|-----------|
//! | `MODEL_DIR`       | required  |
//! | `SNAC_DIR`        | required  |
//! | `TOKENIZER_DIR`   | MODEL_DIR |
//! | `FRAME_LAYOUT`    | built-in Orpheus/SNAC layout |
//! | `DEVICE`          | `auto`    |
//! | `HOST` / `PORT`   | `0.0.0.0` / `7878` |
//! | `MAX_CONCURRENCY` | `1`       |
//! | `MAX_NEW_TOKENS`  | `1024`    |

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use orpheus_tts::{
    device_info, parse_device, FrameLayout, OrpheusTTS, SynthesisError, SynthesisOptions,
};

const DEFAULT_VOICE: &str = "tara";

struct AppState {
    tts: Arc<OrpheusTTS>,
    semaphore: Semaphore,
    max_new_tokens: usize,
    device_label: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    kind: Option<&'static str>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            kind: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            kind: None,
        }
    }
}

impl From<SynthesisError> for ApiError {
    fn from(err: SynthesisError) -> Self {
        let status = match err.root() {
            SynthesisError::EmptyFrameGroup => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match err.root() {
            SynthesisError::EmptyFrameGroup => "no audio generated".to_string(),
            _ => error_chain(&err),
        };
        tracing::warn!(kind = err.kind(), "synthesis failed: {}", message);
        Self {
            status,
            message,
            kind: Some(err.kind()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            kind: self.kind,
        });
        (self.status, body).into_response()
    }
}

/// The error message followed by each of its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

#[derive(Debug, Default, Deserialize)]
struct OptionsRequest {
    max_new_tokens: Option<usize>,
    temperature: Option<f64>,
    top_k: Option<usize>,
    top_p: Option<f64>,
    repetition_penalty: Option<f64>,
    seed: Option<u64>,
}

/// Query-string form of a request; sampling options only come in the body.
#[derive(Debug, Default, Deserialize)]
struct GenerateQuery {
    text: Option<String>,
    voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateRequest {
    text: Option<String>,
    voice: Option<String>,
    #[serde(default)]
    options: Option<OptionsRequest>,
}

fn options_from_request(
    req: Option<OptionsRequest>,
    max_new_tokens: usize,
) -> Result<SynthesisOptions, ApiError> {
    let mut options = SynthesisOptions {
        max_new_tokens,
        ..Default::default()
    };
    let Some(req) = req else {
        return Ok(options);
    };

    if let Some(n) = req.max_new_tokens {
        if n == 0 || n > max_new_tokens {
            return Err(ApiError::bad_request(format!(
                "max_new_tokens must be in 1..={max_new_tokens}"
            )));
        }
        options.max_new_tokens = n;
    }
    if let Some(v) = req.temperature {
        if v < 0.0 {
            return Err(ApiError::bad_request("temperature must be >= 0"));
        }
        options.temperature = v;
    }
    if let Some(v) = req.top_k {
        options.top_k = v;
    }
    if let Some(v) = req.top_p {
        if !(0.0..=1.0).contains(&v) {
            return Err(ApiError::bad_request("top_p must be in [0, 1]"));
        }
        options.top_p = v;
    }
    if let Some(v) = req.repetition_penalty {
        if v <= 0.0 {
            return Err(ApiError::bad_request("repetition_penalty must be > 0"));
        }
        options.repetition_penalty = v;
    }
    options.seed = req.seed.or(options.seed);
    Ok(options)
}

/// Merge the JSON body (if any) over the query parameters.
fn parse_request(query: GenerateQuery, body: &[u8]) -> Result<GenerateRequest, ApiError> {
    let body: GenerateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateRequest::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?
    };
    Ok(GenerateRequest {
        text: body.text.or(query.text),
        voice: body.voice.or(query.voice),
        options: body.options,
    })
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GenerateQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req = parse_request(query, &body)?;
    let text = req
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("text is required"))?;
    let voice = req.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string());
    let options = options_from_request(req.options, state.max_new_tokens)?;

    let _permit = state
        .semaphore
        .acquire()
        .await
        .map_err(|e| ApiError::internal(format!("semaphore closed: {e}")))?;
    let tts = state.tts.clone();

    let (wav, sample_rate) = tokio::task::spawn_blocking(move || {
        let (audio, timing) = tts.synthesize_with_timing(&text, Some(&voice), Some(options))?;
        tracing::info!(
            voice = %voice,
            chars = text.len(),
            audio_seconds = timing.audio_seconds,
            generation_ms = timing.generation_ms,
            decode_ms = timing.decode_ms,
            "request complete"
        );
        let wav = audio
            .to_wav_bytes()
            .map_err(|e| ApiError::internal(format!("failed to encode wav: {e}")))?;
        Ok::<_, ApiError>((wav, audio.sample_rate))
    })
    .await
    .map_err(|e| ApiError::internal(format!("task join error: {e}")))??;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert("x-sample-rate", HeaderValue::from(sample_rate));
    Ok((StatusCode::OK, headers, wav).into_response())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    device: String,
    layout: String,
    sample_rate: u32,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        device: state.device_label.clone(),
        layout: state.tts.layout().name().to_string(),
        sample_rate: state.tts.sample_rate(),
    })
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let model_dir =
        std::env::var("MODEL_DIR").map_err(|_| anyhow::anyhow!("MODEL_DIR is required"))?;
    let snac_dir =
        std::env::var("SNAC_DIR").map_err(|_| anyhow::anyhow!("SNAC_DIR is required"))?;
    let tokenizer_dir = std::env::var("TOKENIZER_DIR").ok();
    let device_str = env_or("DEVICE", "auto".to_string())?;
    let host = env_or("HOST", "0.0.0.0".to_string())?;
    let port: u16 = env_or("PORT", 7878)?;
    let max_concurrency: usize = env_or("MAX_CONCURRENCY", 1)?;
    let max_new_tokens: usize = env_or("MAX_NEW_TOKENS", 1024)?;

    let layout = match std::env::var("FRAME_LAYOUT") {
        Ok(path) => FrameLayout::load(&path)?,
        Err(_) => FrameLayout::orpheus_snac_24khz(),
    };

    let device = parse_device(&device_str)?;
    let device_label = device_info(&device);
    tracing::info!("Loading models on {}", device_label);

    let tts = OrpheusTTS::from_pretrained_with_tokenizer(
        &model_dir,
        tokenizer_dir.as_deref().map(Path::new),
        &snac_dir,
        Some(layout),
        device,
    )?;

    let state = Arc::new(AppState {
        tts: Arc::new(tts),
        semaphore: Semaphore::new(max_concurrency.max(1)),
        max_new_tokens,
        device_label,
    });

    let app = Router::new()
        .route("/generate", post(generate))
        .route("/health", get(health))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
