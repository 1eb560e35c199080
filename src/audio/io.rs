//! WAV reading and writing for synthesized audio.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{Cursor, Seek, Write};
use std::path::Path;

/// Mono waveform produced by the codec decoder.
///
/// Samples are 32-bit floats, nominally in \[-1.0, 1.0\] (SNAC ends in a
/// `tanh`). The buffer is returned to the caller as-is; nothing in this
/// crate post-processes it.
///
/// ```rust,ignore
/// let audio = tts.synthesize("Hello there", Some("tara"), None)?;
/// audio.save("hello.wav")?;
/// let bytes = audio.to_wav_bytes()?;
/// ```
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz (24000 for SNAC 24kHz)
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Save as a 16-bit PCM WAV file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_wav(path, &self.samples, self.sample_rate)
    }

    /// Load a WAV file, downmixing to mono
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_wav(path)
    }

    /// Encode as an in-memory WAV file
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        encode_wav(&self.samples, self.sample_rate)
    }
}

fn pcm16_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn write_pcm16<W: Write + Seek>(writer: &mut WavWriter<W>, samples: &[f32]) -> Result<()> {
    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(scaled)?;
    }
    Ok(())
}

/// Load a WAV file into an AudioBuffer
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok(AudioBuffer::new(mono, spec.sample_rate))
}

/// Save samples to a 16-bit PCM mono WAV file
pub fn save_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WavWriter::create(path, pcm16_spec(sample_rate))
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
    write_pcm16(&mut writer, samples)?;
    writer.finalize()?;
    Ok(())
}

/// Encode samples as a 16-bit PCM mono WAV file in memory
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, pcm16_spec(sample_rate))
            .context("Failed to start WAV stream")?;
        write_pcm16(&mut writer, samples)?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
