//! Looper configuration (`config.yaml`)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioConfig, CaptureConstraints};
use crate::engine::EngineOptions;

/// Largest user latency compensation, either direction (seconds)
pub const MAX_LATENCY_COMPENSATION_SECONDS: f64 = 0.05;

/// Longest recording accepted from a config file (one hour)
const MAX_RECORDING_SECONDS_LIMIT: f64 = 3600.0;

/// Accepted gain ramp durations (seconds)
///
/// Shorter ramps click on a gain change; longer ones lag the fader.
const GAIN_RAMP_SECONDS_RANGE: (f64, f64) = (0.005, 0.1);

/// Looper configuration
///
/// ```yaml
/// max_recording_seconds: 300.0
/// update_progress_interval_seconds: 0.05
/// latency_compensation_seconds: 0.0
/// capture:
///   echo_cancellation: true
/// audio:
///   buffer_size: LowLatency
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    /// Longest loop that can be recorded; sets the base buffer capacity
    pub max_recording_seconds: f64,
    /// Time between two progress reports from the engine
    pub update_progress_interval_seconds: f64,
    /// Added to the measured latency before it reaches the engine
    pub latency_compensation_seconds: f64,
    /// How often observers get a fresh latency estimate (0 = never)
    pub latency_poll_interval_ms: u64,
    /// Duration of the gain ramp applied on every gain change, 5 to 100 ms
    pub gain_ramp_seconds: f64,
    /// Gain at startup (1.0 = unity)
    pub initial_gain: f32,
    /// Most overdub layers kept before passes fold into the newest one
    pub max_overdub_layers: usize,
    /// Total audio held by all overdub layers together
    pub overdub_arena_seconds: f64,
    /// Requested capture processing
    pub capture: CaptureConstraints,
    /// Devices, buffer size and sample rate
    pub audio: AudioConfig,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            max_recording_seconds: 300.0,
            update_progress_interval_seconds: 0.05,
            latency_compensation_seconds: 0.0,
            latency_poll_interval_ms: 1000,
            gain_ramp_seconds: 0.05,
            initial_gain: 1.0,
            max_overdub_layers: 32,
            overdub_arena_seconds: 600.0,
            capture: CaptureConstraints::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl LooperConfig {
    /// Replace out-of-range values with usable ones
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if !positive(self.max_recording_seconds) {
            log::warn!(
                "Invalid max_recording_seconds {}, using {}",
                self.max_recording_seconds,
                defaults.max_recording_seconds
            );
            self.max_recording_seconds = defaults.max_recording_seconds;
        }
        if self.max_recording_seconds > MAX_RECORDING_SECONDS_LIMIT {
            log::warn!(
                "max_recording_seconds {} exceeds {}, clamping",
                self.max_recording_seconds,
                MAX_RECORDING_SECONDS_LIMIT
            );
            self.max_recording_seconds = MAX_RECORDING_SECONDS_LIMIT;
        }

        if !positive(self.update_progress_interval_seconds) {
            self.update_progress_interval_seconds = defaults.update_progress_interval_seconds;
        }

        self.latency_compensation_seconds = if self.latency_compensation_seconds.is_finite() {
            self.latency_compensation_seconds.clamp(
                -MAX_LATENCY_COMPENSATION_SECONDS,
                MAX_LATENCY_COMPENSATION_SECONDS,
            )
        } else {
            0.0
        };

        let (ramp_min, ramp_max) = GAIN_RAMP_SECONDS_RANGE;
        self.gain_ramp_seconds = if self.gain_ramp_seconds.is_finite() {
            self.gain_ramp_seconds.clamp(ramp_min, ramp_max)
        } else {
            defaults.gain_ramp_seconds
        };
        if !self.initial_gain.is_finite() || self.initial_gain < 0.0 {
            self.initial_gain = defaults.initial_gain;
        }

        self.max_overdub_layers = self.max_overdub_layers.max(1);
        if !positive(self.overdub_arena_seconds)
            || self.overdub_arena_seconds < self.max_recording_seconds
        {
            self.overdub_arena_seconds = self.max_recording_seconds;
        }

        self.capture.channel_count = self.capture.channel_count.max(1);
        self
    }

    /// Engine construction options at `sample_rate`
    pub fn engine_options(&self, sample_rate: u32) -> EngineOptions {
        EngineOptions::from_seconds(
            sample_rate,
            self.max_recording_seconds,
            self.update_progress_interval_seconds,
            self.overdub_arena_seconds,
            self.max_overdub_layers,
        )
    }

    /// Length of the gain ramp in samples
    pub fn gain_ramp_samples(&self, sample_rate: u32) -> usize {
        (self.gain_ramp_seconds.max(0.0) * sample_rate as f64).round() as usize
    }

    /// Latency refresh period, if enabled
    pub fn latency_poll_interval(&self) -> Option<Duration> {
        (self.latency_poll_interval_ms > 0)
            .then(|| Duration::from_millis(self.latency_poll_interval_ms))
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
