//! Token sampling for autoregressive generation
//!
//! Works on a single row of logits copied to the host. Orpheus decodes one
//! sequence at a time, so there is no batch dimension to keep on device.
//! Create a [`SamplingContext`] with a seed for reproducible output.

use anyhow::{bail, Result};
use std::cmp::Ordering;

/// RNG state for one generation session.
///
/// Each request owns its own context, so concurrent requests never share
/// random state. A seeded context produces the same sequence on every run.
#[derive(Debug, Clone)]
pub struct SamplingContext {
    state: u64,
}

impl SamplingContext {
    /// Create a context; `None` seeds from the system clock.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });
        let mut ctx = Self { state: 0 };
        ctx.reset(seed);
        ctx
    }

    /// Restart the sequence from `seed`.
    pub fn reset(&mut self, seed: u64) {
        self.state = seed
            .wrapping_mul(2685821657736338717)
            .wrapping_add(1442695040888963407);
    }

    /// Uniform f32 in [0, 1) (PCG XSH RR 64/32, top 24 bits).
    fn rand_f32(&mut self) -> f32 {
        let old = self.state;
        self.state = old
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let out = xorshifted.rotate_right((old >> 59) as u32);
        (out >> 8) as f32 / (1u32 << 24) as f32
    }
}

/// Configuration for autoregressive generation
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Maximum number of new tokens to generate
    pub max_new_tokens: usize,
    /// Sampling temperature (<= 0.01 falls back to greedy)
    pub temperature: f64,
    /// Top-k sampling (0 = disabled)
    pub top_k: usize,
    /// Top-p (nucleus) threshold (1.0 = disabled)
    pub top_p: f64,
    /// Repetition penalty over prompt and generated tokens (1.0 = disabled)
    pub repetition_penalty: f64,
    /// Generation stops after any of these is sampled
    pub stop_tokens: Vec<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 1024,
            temperature: 0.7,
            top_k: 50,
            top_p: 1.0,
            repetition_penalty: 1.1,
            stop_tokens: Vec::new(),
        }
    }
}

/// Sample the next token id from one row of logits.
pub fn sample(logits: &[f32], config: &GenerationConfig, ctx: &mut SamplingContext) -> Result<u32> {
    if logits.is_empty() {
        bail!("cannot sample from empty logits");
    }
    if config.temperature < 0.01 {
        return Ok(greedy_sample(logits));
    }

    let inv_temp = (1.0 / config.temperature) as f32;
    let mut scaled: Vec<f32> = logits.iter().map(|&v| v * inv_temp).collect();

    if config.top_k > 0 {
        top_k_filter(&mut scaled, config.top_k);
    }
    if config.top_p > 0.0 && config.top_p < 1.0 {
        top_p_filter(&mut scaled, config.top_p);
    }

    let probs = softmax(&scaled);
    Ok(multinomial_sample(&probs, ctx))
}

/// Index of the largest logit.
pub fn greedy_sample(logits: &[f32]) -> u32 {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i as u32)
        .unwrap_or(0)
}

/// Penalize every token that already appears in `history`.
///
/// Positive logits are divided by `penalty`, negative ones multiplied, so a
/// penalty above 1.0 always makes a repeat less likely. Each token is
/// penalized once no matter how often it occurred.
pub fn apply_repetition_penalty(logits: &mut [f32], history: &[u32], penalty: f64) {
    if (penalty - 1.0).abs() < 1e-9 {
        return;
    }
    let penalty = penalty as f32;
    let mut seen = vec![false; logits.len()];
    for &id in history {
        let idx = id as usize;
        if idx < logits.len() && !seen[idx] {
            seen[idx] = true;
            let v = logits[idx];
            logits[idx] = if v > 0.0 { v / penalty } else { v * penalty };
        }
    }
}

/// Keep the `k` largest logits, set the rest to -inf.
fn top_k_filter(logits: &mut [f32], k: usize) {
    let k = k.min(logits.len());
    if k == logits.len() {
        return;
    }
    let mut sorted = logits.to_vec();
    sorted.select_nth_unstable_by(k - 1, |a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    let threshold = sorted[k - 1];
    for v in logits.iter_mut() {
        if *v < threshold {
            *v = f32::NEG_INFINITY;
        }
    }
}

/// Keep the smallest set of most likely tokens whose probability mass
/// exceeds `p`, set the rest to -inf.
fn top_p_filter(logits: &mut [f32], p: f64) {
    let mut order: Vec<usize> = (0..logits.len()).collect();
    order.sort_unstable_by(|&a, &b| {
        logits[b]
            .partial_cmp(&logits[a])
            .unwrap_or(Ordering::Equal)
    });

    let sorted: Vec<f32> = order.iter().map(|&i| logits[i]).collect();
    let probs = softmax(&sorted);

    let mut cumulative = 0.0f32;
    let mut keep = order.len();
    for (rank, &prob) in probs.iter().enumerate() {
        cumulative += prob;
        if cumulative > p as f32 {
            keep = rank + 1;
            break;
        }
    }
    for &idx in &order[keep..] {
        logits[idx] = f32::NEG_INFINITY;
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

/// Draw an index from a probability vector.
fn multinomial_sample(probs: &[f32], ctx: &mut SamplingContext) -> u32 {
    let target = ctx.rand_f32();
    let mut cumulative = 0.0f32;
    let mut last_nonzero = 0;
    for (i, &p) in probs.iter().enumerate() {
        if p > 0.0 {
            last_nonzero = i;
        }
        cumulative += p;
        if cumulative > target && p > 0.0 {
            return i as u32;
        }
    }
    // Rounding left the cumulative sum just under `target`.
    last_nonzero as u32
}
