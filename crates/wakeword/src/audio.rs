//! Audio input plumbing.
//!
//! The pipeline consumes hardware audio through the [`AudioSource`]
//! contract; everything else here exists so the CLI can feed it from
//! WAV files, stdin streams, and microphone capture:
//! - minimal WAV parser (16-bit PCM)
//! - linear resampling to the configured sample rate
//! - a drop-oldest capture ring for real-time callbacks

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::WakeError;

/// Hardware read contract: fill `buffer` completely within `timeout`
/// or report failure. A short read must never be returned silently.
pub trait AudioSource {
    fn read(&mut self, buffer: &mut [i16], timeout: Duration) -> Result<(), WakeError>;
}

/// Plays back a fixed sample buffer; the test double for the hardware
/// collaborator. Reports `HardwareReadTimeout` once exhausted.
#[derive(Debug, Clone)]
pub struct SliceSource {
    samples: Vec<i16>,
    pos: usize,
}

impl SliceSource {
    #[must_use]
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.pos
    }
}

impl AudioSource for SliceSource {
    fn read(&mut self, buffer: &mut [i16], _timeout: Duration) -> Result<(), WakeError> {
        if self.remaining() < buffer.len() {
            return Err(WakeError::HardwareReadTimeout);
        }
        buffer.copy_from_slice(&self.samples[self.pos..self.pos + buffer.len()]);
        self.pos += buffer.len();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WavData {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub samples_mono: Vec<i16>,
}

#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("not a valid WAV file")]
    InvalidHeader,
    #[error("unsupported WAV format (need 16-bit PCM)")]
    UnsupportedFormat,
    #[error("malformed WAV chunks")]
    MalformedChunks,
}

fn read_u16_le(p: &[u8]) -> u16 {
    u16::from_le_bytes([p[0], p[1]])
}

fn read_u32_le(p: &[u8]) -> u32 {
    u32::from_le_bytes([p[0], p[1], p[2], p[3]])
}

/// Parse WAV bytes into mono `i16` samples at the file's sample rate.
///
/// Supports: PCM (`audio_format=1`), 16-bit, >=1 channels.
pub fn parse_wav_bytes(data: &[u8]) -> Result<WavData, WavError> {
    if data.len() < 44 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(WavError::InvalidHeader);
    }

    let mut channels: u16 = 0;
    let mut sample_rate_hz: u32 = 0;
    let mut bits_per_sample: u16 = 0;
    let mut audio_format: u16 = 0;
    let mut pcm_data: Option<&[u8]> = None;

    let mut p = 12usize;
    while p + 8 <= data.len() {
        let chunk_id = &data[p..p + 4];
        let chunk_size = read_u32_le(&data[p + 4..p + 8]) as usize;
        let chunk_data_start = p + 8;
        let chunk_data_end = chunk_data_start.saturating_add(chunk_size);
        if chunk_data_end > data.len() {
            break;
        }

        if chunk_id == b"fmt " && chunk_size >= 16 {
            audio_format = read_u16_le(&data[chunk_data_start..chunk_data_start + 2]);
            channels = read_u16_le(&data[chunk_data_start + 2..chunk_data_start + 4]);
            sample_rate_hz = read_u32_le(&data[chunk_data_start + 4..chunk_data_start + 8]);
            bits_per_sample = read_u16_le(&data[chunk_data_start + 14..chunk_data_start + 16]);
        } else if chunk_id == b"data" {
            pcm_data = Some(&data[chunk_data_start..chunk_data_end]);
        }

        p = chunk_data_end;
        if chunk_size & 1 == 1 {
            p = p.saturating_add(1);
        }
    }

    let Some(pcm_data) = pcm_data else {
        return Err(WavError::MalformedChunks);
    };

    if audio_format != 1 || bits_per_sample != 16 || channels < 1 {
        return Err(WavError::UnsupportedFormat);
    }

    let frame_bytes = usize::from(channels) * 2;
    let n_frames = pcm_data.len() / frame_bytes;

    let mut samples_mono = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        let frame = &pcm_data[i * frame_bytes..(i + 1) * frame_bytes];
        if channels == 1 {
            samples_mono.push(i16::from_le_bytes([frame[0], frame[1]]));
        } else {
            let mut sum = 0i32;
            for c in 0..channels {
                let off = (c as usize) * 2;
                sum += i32::from(i16::from_le_bytes([frame[off], frame[off + 1]]));
            }
            samples_mono.push((sum / i32::from(channels)) as i16);
        }
    }

    Ok(WavData {
        sample_rate_hz,
        channels,
        samples_mono,
    })
}

/// Linearly resample `input` from `src_hz` to `dst_hz`.
#[must_use]
pub fn resample_linear_mono_i16(input: &[i16], src_hz: u32, dst_hz: u32) -> Vec<i16> {
    if src_hz == dst_hz || input.is_empty() {
        return input.to_vec();
    }

    let new_n = ((input.len() as u64) * u64::from(dst_hz) / u64::from(src_hz)) as usize;
    let mut out = Vec::with_capacity(new_n);

    for i in 0..new_n {
        let src_pos = (i as f64) * f64::from(src_hz) / f64::from(dst_hz);
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = input.get(idx).copied().unwrap_or(0) as f32;
        let b = input.get(idx + 1).copied().unwrap_or(a as i16) as f32;
        out.push((a * (1.0 - frac) + b * frac).round() as i16);
    }

    out
}

/// Fixed-capacity capture ring that drops the *oldest* samples on
/// overflow. Real-time callbacks must never block, so unlike the
/// pipeline's reject-on-full [`crate::ring::SampleRingBuffer`], this
/// one trades old audio for bounded latency.
#[derive(Debug)]
pub struct DropOldestRing {
    cap: usize,
    buf: VecDeque<i16>,
    dropped: u64,
}

impl DropOldestRing {
    #[must_use]
    pub fn new(cap_samples: usize) -> Self {
        Self {
            cap: cap_samples,
            buf: VecDeque::with_capacity(cap_samples.min(16_384)),
            dropped: 0,
        }
    }

    #[must_use]
    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, samples: &[i16]) {
        for &s in samples {
            if self.buf.len() == self.cap {
                self.buf.pop_front();
                self.dropped += 1;
            }
            self.buf.push_back(s);
        }
    }

    /// Drain up to `max` samples into `out`.
    pub fn drain_into(&mut self, out: &mut Vec<i16>, max: usize) {
        let n = self.buf.len().min(max);
        out.clear();
        out.reserve(n);
        for _ in 0..n {
            if let Some(v) = self.buf.pop_front() {
                out.push(v);
            }
        }
    }
}
