use std::io::Read;
use std::path::PathBuf;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};
use wakeword::audio::{
    AudioSource, DropOldestRing, SliceSource, parse_wav_bytes, resample_linear_mono_i16,
};
use wakeword::config::DetectorConfig;
use wakeword::coop::ThreadYield;
use wakeword::error::WakeError;
use wakeword::model::ModelBundle;
use wakeword::network::{ModelWeights, NetworkTopology};
use wakeword::{CycleOutcome, WakeWordPipeline};

#[derive(Debug, Parser)]
#[command(name = "wakeword")]
#[command(about = "Streaming wake-word detector", long_about = None)]
struct Args {
    /// Path to a WAV file.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Read audio from stdin (WAV or raw s16le 16kHz mono).
    #[arg(long, default_value_t = false)]
    stdin: bool,

    /// Capture audio from microphone (cross-platform).
    #[arg(long, default_value_t = false)]
    from_mic: bool,

    /// Model directory with config.json / model.safetensors.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Validate model assets without running detection.
    #[arg(long, default_value_t = false)]
    inspect_model: bool,

    /// Override the detection confidence threshold from config.json.
    #[arg(long)]
    threshold: Option<f32>,

    /// Seconds between status reports while listening.
    #[arg(long, default_value_t = 1.0)]
    report_every: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.inspect_model {
        let model_dir = args
            .model_dir
            .as_ref()
            .context("--inspect-model requires --model-dir")?;
        return inspect_model(model_dir);
    }

    let modes = u32::from(args.audio.is_some()) + u32::from(args.stdin) + u32::from(args.from_mic);
    if modes != 1 {
        anyhow::bail!("choose exactly one input mode: --audio, --stdin, or --from-mic");
    }

    let (config, weights) = load_model(args.model_dir.as_deref(), args.threshold)?;

    if let Some(path) = args.audio {
        return run_offline(read_wav_file(&path, config.sample_rate_hz)?, config, weights);
    }

    if args.stdin {
        return run_offline(read_stdin_samples(config.sample_rate_hz)?, config, weights);
    }

    run_mic(
        config,
        weights,
        Duration::from_secs_f32(args.report_every.max(0.1)),
    )
}

fn load_model(
    model_dir: Option<&std::path::Path>,
    threshold: Option<f32>,
) -> Result<(DetectorConfig, ModelWeights)> {
    let (mut config, weights) = match model_dir {
        Some(dir) => {
            let bundle = ModelBundle::load_from_dir(dir).context("load model bundle")?;
            (bundle.config, bundle.weights)
        }
        None => {
            warn!("no --model-dir given, using zeroed weights (smoke mode, never detects)");
            let config = DetectorConfig::default();
            let topology = NetworkTopology::dscnn(
                config.feature.frames,
                config.feature.coeffs,
                config.classes.len(),
            );
            let weights = ModelWeights::zeroed(&topology)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("build zeroed weights")?;
            (config, weights)
        }
    };
    if let Some(t) = threshold {
        config.threshold = t;
        config.validate()?;
    }
    Ok((config, weights))
}

fn inspect_model(model_dir: &std::path::Path) -> Result<()> {
    let bundle = ModelBundle::load_from_dir(model_dir).context("load model bundle")?;
    let params: usize = bundle
        .weights
        .layers
        .iter()
        .map(|l| l.weights.len() + l.bias.len())
        .sum();
    eprintln!(
        "model ok: classes={} window={} feature={}x{} layers={} params={}",
        bundle.config.classes.len(),
        bundle.config.window_size,
        bundle.config.feature.frames,
        bundle.config.feature.coeffs,
        bundle.weights.layers.len(),
        params
    );
    Ok(())
}

fn read_wav_file(path: &PathBuf, target_hz: u32) -> Result<Vec<i16>> {
    let bytes = std::fs::read(path).with_context(|| format!("read file {path:?}"))?;
    let wav = parse_wav_bytes(&bytes).context("parse wav")?;
    Ok(if wav.sample_rate_hz == target_hz {
        wav.samples_mono
    } else {
        resample_linear_mono_i16(&wav.samples_mono, wav.sample_rate_hz, target_hz)
    })
}

fn read_stdin_samples(target_hz: u32) -> Result<Vec<i16>> {
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("read stdin")?;

    if buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE" {
        let wav = parse_wav_bytes(&buf).context("parse wav")?;
        return Ok(if wav.sample_rate_hz == target_hz {
            wav.samples_mono
        } else {
            resample_linear_mono_i16(&wav.samples_mono, wav.sample_rate_hz, target_hz)
        });
    }

    // raw s16le 16kHz mono
    if buf.len() % 2 != 0 {
        buf.pop();
    }
    Ok(buf
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

/// Drive the pipeline over a fixed sample buffer. Time is derived from
/// the audio itself so debouncing behaves as it would live.
fn run_offline(samples: Vec<i16>, config: DetectorConfig, weights: ModelWeights) -> Result<()> {
    let total = samples.len();
    let rate = u64::from(config.sample_rate_hz);

    let mut pipeline = WakeWordPipeline::new(SliceSource::new(samples));
    pipeline
        .initialize(config, weights)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("initialize pipeline")?;

    // Once reads stop consuming input (source dry, or less than one
    // burst left), a couple more cycles flush any buffered window.
    let mut flush = 2usize;
    let mut last_remaining = usize::MAX;
    loop {
        let consumed = (total - pipeline.source().remaining()) as u64;
        let now_ms = consumed * 1000 / rate;
        match pipeline
            .run_cycle(now_ms)
            .map_err(|e| anyhow::anyhow!("{e}"))?
        {
            CycleOutcome::Detection(event) => {
                println!(
                    "DETECTED {} confidence={:.3} t={:.2}s #{}",
                    event.class_name,
                    event.confidence,
                    event.timestamp_ms as f32 / 1000.0,
                    event.detection_number
                );
            }
            CycleOutcome::NoEvent => {}
        }
        let remaining = pipeline.source().remaining();
        if remaining == last_remaining {
            if flush == 0 {
                break;
            }
            flush -= 1;
        }
        last_remaining = remaining;
    }

    info!(
        detections = pipeline.detection_count(),
        seconds = total as f32 / rate as f32,
        "finished"
    );
    Ok(())
}

/// Pulls 16kHz mono samples out of the shared capture ring, blocking
/// up to the read timeout while the callback fills it.
struct MicSource {
    ring: Arc<Mutex<DropOldestRing>>,
    src_hz: u32,
    dst_hz: u32,
    pending: Vec<i16>,
    tmp: Vec<i16>,
}

impl MicSource {
    fn new(ring: Arc<Mutex<DropOldestRing>>, src_hz: u32, dst_hz: u32) -> Self {
        Self {
            ring,
            src_hz,
            dst_hz,
            pending: Vec::new(),
            tmp: Vec::new(),
        }
    }
}

impl AudioSource for MicSource {
    fn read(&mut self, buffer: &mut [i16], timeout: Duration) -> Result<(), WakeError> {
        let deadline = Instant::now() + timeout;
        while self.pending.len() < buffer.len() {
            {
                let mut r = self.ring.lock().expect("ring lock");
                r.drain_into(&mut self.tmp, self.src_hz as usize / 10);
            }
            if self.tmp.is_empty() {
                if Instant::now() >= deadline {
                    return Err(WakeError::HardwareReadTimeout);
                }
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
            if self.src_hz == self.dst_hz {
                self.pending.extend_from_slice(&self.tmp);
            } else {
                self.pending
                    .extend(resample_linear_mono_i16(&self.tmp, self.src_hz, self.dst_hz));
            }
        }
        let n = buffer.len();
        buffer.copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(())
    }
}

fn run_mic(config: DetectorConfig, weights: ModelWeights, report_every: Duration) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("no default input device")?;

    let cfg = device.default_input_config().context("default config")?;
    let channels = cfg.channels();
    let src_hz = cfg.sample_rate().0;
    let stream_config: cpal::StreamConfig = cfg.clone().into();

    info!(
        device = ?device.name().ok(),
        sample_rate = src_hz,
        channels,
        format = ?cfg.sample_format(),
        "mic opened"
    );

    // Keep ~5 seconds of source-rate audio to bound latency.
    let cap_samples = (src_hz as usize).saturating_mul(5);
    let ring = Arc::new(Mutex::new(DropOldestRing::new(cap_samples)));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("install ctrl-c handler")?;
    }

    let err_fn = |e| eprintln!("mic stream error: {e}");

    let stream = match cfg.sample_format() {
        cpal::SampleFormat::F32 => {
            let ring_cb = Arc::clone(&ring);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    let mut mono = Vec::with_capacity(data.len() / channels as usize);
                    for frame in data.chunks_exact(channels as usize) {
                        let mut sum = 0.0f32;
                        for &s in frame {
                            sum += s;
                        }
                        let avg = sum / (channels as f32);
                        mono.push((avg * 32767.0).clamp(-32768.0, 32767.0) as i16);
                    }
                    let mut r = ring_cb.lock().expect("ring lock");
                    r.push(&mono);
                },
                err_fn,
                None,
            )?
        }
        cpal::SampleFormat::I16 => {
            let ring_cb = Arc::clone(&ring);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    let mut mono = Vec::with_capacity(data.len() / channels as usize);
                    for frame in data.chunks_exact(channels as usize) {
                        let mut sum = 0i32;
                        for &s in frame {
                            sum += i32::from(s);
                        }
                        mono.push((sum / i32::from(channels)) as i16);
                    }
                    let mut r = ring_cb.lock().expect("ring lock");
                    r.push(&mono);
                },
                err_fn,
                None,
            )?
        }
        cpal::SampleFormat::U16 => {
            let ring_cb = Arc::clone(&ring);
            device.build_input_stream(
                &stream_config,
                move |data: &[u16], _| {
                    let mut mono = Vec::with_capacity(data.len() / channels as usize);
                    for frame in data.chunks_exact(channels as usize) {
                        let mut sum = 0i32;
                        for &s in frame {
                            sum += i32::from(s) - 32768;
                        }
                        mono.push((sum / i32::from(channels)) as i16);
                    }
                    let mut r = ring_cb.lock().expect("ring lock");
                    r.push(&mono);
                },
                err_fn,
                None,
            )?
        }
        other => anyhow::bail!("unsupported sample format: {other:?}"),
    };

    stream.play().context("start mic stream")?;

    let target_hz = config.sample_rate_hz;
    let source = MicSource::new(Arc::clone(&ring), src_hz, target_hz);
    let mut pipeline = WakeWordPipeline::new(source);
    pipeline.set_yield_hook(Box::new(ThreadYield));
    pipeline
        .initialize(config, weights)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("initialize pipeline")?;

    let start = Instant::now();
    let mut last_report = Instant::now();
    while running.load(Ordering::SeqCst) {
        let now_ms = start.elapsed().as_millis() as u64;
        match pipeline
            .run_cycle(now_ms)
            .map_err(|e| anyhow::anyhow!("{e}"))?
        {
            CycleOutcome::Detection(event) => {
                println!(
                    "DETECTED {} confidence={:.3} t={:.1}s #{}",
                    event.class_name,
                    event.confidence,
                    now_ms as f32 / 1000.0,
                    event.detection_number
                );
            }
            CycleOutcome::NoEvent => {}
        }

        if last_report.elapsed() >= report_every {
            let dropped = ring.lock().expect("ring lock").dropped_samples();
            info!(
                t = format_args!("{:.1}s", start.elapsed().as_secs_f32()),
                detections = pipeline.detection_count(),
                dropped_samples = dropped,
                rejected_samples = pipeline.rejected_samples(),
                "listening"
            );
            last_report = Instant::now();
        }
    }

    info!(
        detections = pipeline.detection_count(),
        "stopped by ctrl-c"
    );
    Ok(())
}
