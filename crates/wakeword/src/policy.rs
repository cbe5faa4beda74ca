//! Detection policy: turning per-window probability vectors into
//! debounced wake events.
//!
//! Time never comes from a system clock here; callers pass a
//! monotonic millisecond timestamp so the policy stays deterministic
//! and testable.

use tracing::debug;

/// One classification over a single analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub probabilities: Vec<f32>,
    pub top_class: usize,
    pub confidence: f32,
}

impl ClassificationResult {
    /// Argmax over a probability vector. Ties resolve to the lowest
    /// class index.
    #[must_use]
    pub fn from_probabilities(probabilities: Vec<f32>) -> Self {
        let mut top_class = 0;
        let mut confidence = f32::NEG_INFINITY;
        for (i, &p) in probabilities.iter().enumerate() {
            if p > confidence {
                top_class = i;
                confidence = p;
            }
        }
        Self {
            probabilities,
            top_class,
            confidence,
        }
    }
}

/// A confirmed wake-word detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub class_index: usize,
    pub class_name: String,
    pub confidence: f32,
    /// 1-based ordinal of this detection since the last counter reset.
    pub detection_number: u64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct DetectionState {
    last_detection_ms: Option<u64>,
    count: u64,
}

pub struct DetectionPolicy {
    threshold: f32,
    cooldown_ms: u64,
    /// Parallel to the class list: true for classes that may fire.
    actionable: Vec<bool>,
    names: Vec<String>,
    state: DetectionState,
}

impl DetectionPolicy {
    #[must_use]
    pub fn new(threshold: f32, cooldown_ms: u64, classes: &[(String, bool)]) -> Self {
        Self {
            threshold,
            cooldown_ms,
            actionable: classes.iter().map(|(_, a)| *a).collect(),
            names: classes.iter().map(|(n, _)| n.clone()).collect(),
            state: DetectionState::default(),
        }
    }

    /// Judge one classification. Fires only when the top class is
    /// actionable, clears the threshold, and the cooldown since the
    /// previous detection has elapsed. State mutates only on fire, so
    /// a rejected window leaves the debounce clock untouched.
    pub fn evaluate(&mut self, result: &ClassificationResult, now_ms: u64) -> Option<DetectionEvent> {
        if !self.actionable.get(result.top_class).copied().unwrap_or(false) {
            return None;
        }
        if result.confidence < self.threshold {
            return None;
        }
        if let Some(last) = self.state.last_detection_ms {
            if now_ms.saturating_sub(last) < self.cooldown_ms {
                debug!(
                    class = result.top_class,
                    confidence = result.confidence,
                    "detection suppressed by cooldown"
                );
                return None;
            }
        }

        self.state.last_detection_ms = Some(now_ms);
        self.state.count += 1;
        Some(DetectionEvent {
            class_index: result.top_class,
            class_name: self
                .names
                .get(result.top_class)
                .cloned()
                .unwrap_or_default(),
            confidence: result.confidence,
            detection_number: self.state.count,
            timestamp_ms: now_ms,
        })
    }

    #[must_use]
    pub fn detection_count(&self) -> u64 {
        self.state.count
    }

    /// Zero the counter. The cooldown clock is left alone so a reset
    /// right after a detection does not re-arm it early.
    pub fn reset_detection_count(&mut self) {
        self.state.count = 0;
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.0, 1.0);
    }

    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}
