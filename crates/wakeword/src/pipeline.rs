//! End-to-end detection pipeline.
//!
//! One `run_cycle` call performs at most one window of work: pull
//! pending samples from the audio source, and once a full analysis
//! window is buffered, extract features, run the network, and judge
//! the result. Hardware read timeouts are transient; the cycle logs
//! them and reports no event rather than propagating.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::arena::TensorArena;
use crate::audio::AudioSource;
use crate::config::DetectorConfig;
use crate::coop::{NoYield, YieldBudget, YieldHook};
use crate::error::WakeError;
use crate::features::{DirectDft, FeatureExtractor};
use crate::network::{ModelWeights, NetworkTopology, QuantizedNetwork};
use crate::policy::{ClassificationResult, DetectionEvent, DetectionPolicy};
use crate::ring::SampleRingBuffer;

/// How long one hardware read may block before the cycle gives up.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Outcome of a single [`WakeWordPipeline::run_cycle`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Detection(DetectionEvent),
    NoEvent,
}

struct Stages {
    ring: SampleRingBuffer,
    extractor: FeatureExtractor,
    network: QuantizedNetwork,
    arena: TensorArena,
    policy: DetectionPolicy,
    window: Vec<i16>,
    read_buf: Vec<i16>,
    max_burst: usize,
}

/// The owned pipeline: audio source in, detection events out. All
/// working memory is allocated by `initialize`; the steady-state path
/// never allocates.
pub struct WakeWordPipeline<S: AudioSource> {
    source: S,
    hook: Box<dyn YieldHook>,
    stages: Option<Stages>,
}

impl<S: AudioSource> WakeWordPipeline<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            hook: Box::new(NoYield),
            stages: None,
        }
    }

    /// Install a hook invoked at the cooperative yield points inside
    /// feature extraction and inference.
    pub fn set_yield_hook(&mut self, hook: Box<dyn YieldHook>) {
        self.hook = hook;
    }

    /// Build every stage and allocate all working memory. Fails on an
    /// undersized arena, inconsistent shapes, or weights that could
    /// overflow an i32 accumulator; nothing is retained on failure.
    pub fn initialize(
        &mut self,
        config: DetectorConfig,
        weights: ModelWeights,
    ) -> Result<(), WakeError> {
        let topology = NetworkTopology::dscnn(
            config.feature.frames,
            config.feature.coeffs,
            config.classes.len(),
        );
        let network = QuantizedNetwork::new(topology, weights, config.quant)?;

        let plan = network.arena_plan();
        let arena = TensorArena::initialize(config.arena_bytes, plan)?;
        network.check_arena(&arena)?;

        let extractor = FeatureExtractor::new(
            config.window_size,
            config.feature,
            config.quant,
            Box::new(DirectDft::new(config.window_size)),
        )?;

        let classes: Vec<(String, bool)> = config
            .classes
            .iter()
            .map(|c| (c.name.clone(), c.actionable))
            .collect();
        let policy = DetectionPolicy::new(config.threshold, config.cooldown_ms, &classes);

        info!(
            window = config.window_size,
            classes = config.classes.len(),
            arena_bytes = config.arena_bytes,
            "pipeline initialized"
        );

        self.stages = Some(Stages {
            ring: SampleRingBuffer::new(config.ring_capacity()),
            extractor,
            network,
            arena,
            policy,
            window: vec![0; config.window_size],
            read_buf: vec![0; config.max_hardware_burst],
            max_burst: config.max_hardware_burst,
        });
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.stages.is_some()
    }

    /// Run one cycle. `now_ms` is a caller-supplied monotonic
    /// millisecond timestamp used only for detection debouncing.
    pub fn run_cycle(&mut self, now_ms: u64) -> Result<CycleOutcome, WakeError> {
        let stages = self.stages.as_mut().ok_or(WakeError::NotInitialized)?;

        // Top up the ring, but never read more than one burst per
        // cycle so a stalled source cannot starve inference.
        let missing = stages.window.len().saturating_sub(stages.ring.len());
        let want = missing.min(stages.max_burst);
        if want > 0 {
            let buf = &mut stages.read_buf[..want];
            match self.source.read(buf, READ_TIMEOUT) {
                Ok(()) => {
                    let accepted = stages.ring.push_slice(buf);
                    if accepted < want {
                        warn!(
                            rejected = want - accepted,
                            "ring full, dropping incoming samples"
                        );
                    }
                }
                Err(WakeError::HardwareReadTimeout) => {
                    debug!("audio read timed out, skipping cycle");
                    return Ok(CycleOutcome::NoEvent);
                }
                Err(e) => return Err(e),
            }
        }

        if !stages.ring.pop_many(&mut stages.window) {
            return Ok(CycleOutcome::NoEvent);
        }

        let mut budget = YieldBudget::new(self.hook.as_mut());

        let input = stages.arena.region_mut(crate::arena::BufferId::Input);
        stages
            .extractor
            .extract(&stages.window, input, &mut budget)?;
        budget.stage_boundary();

        stages.network.infer(&mut stages.arena, &mut budget);

        let result =
            ClassificationResult::from_probabilities(stages.arena.output().to_vec());
        debug!(
            top_class = result.top_class,
            confidence = result.confidence,
            "window classified"
        );

        match stages.policy.evaluate(&result, now_ms) {
            Some(event) => {
                info!(
                    class = %event.class_name,
                    confidence = event.confidence,
                    number = event.detection_number,
                    "wake word detected"
                );
                Ok(CycleOutcome::Detection(event))
            }
            None => Ok(CycleOutcome::NoEvent),
        }
    }

    /// Detections since the last reset. Zero before initialization.
    #[must_use]
    pub fn detection_count(&self) -> u64 {
        self.stages
            .as_ref()
            .map_or(0, |s| s.policy.detection_count())
    }

    pub fn reset_detection_count(&mut self) -> Result<(), WakeError> {
        let stages = self.stages.as_mut().ok_or(WakeError::NotInitialized)?;
        stages.policy.reset_detection_count();
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: f32) -> Result<(), WakeError> {
        let stages = self.stages.as_mut().ok_or(WakeError::NotInitialized)?;
        stages.policy.set_threshold(threshold);
        Ok(())
    }

    /// Samples rejected because the ring was full, since startup.
    #[must_use]
    pub fn rejected_samples(&self) -> u64 {
        self.stages.as_ref().map_or(0, |s| s.ring.rejected_samples())
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }
}
