//! Round-trip latency estimate

use crate::audio::{LatencyMeter, StreamFormat};
use crate::engine::EngineCommand;

/// Latency of the whole loop path, in seconds
///
/// `input_secs` is what the capture stream reports, `output_secs` the output
/// stream's report plus one block of buffering, `compensation_secs` the
/// performer's manual correction (may be negative).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatencyEstimate {
    pub input_secs: f64,
    pub output_secs: f64,
    pub compensation_secs: f64,
    /// The capture stream gives no timestamps, so `input_secs` was not
    /// measured and only compensation can account for it
    pub input_unavailable: bool,
}

impl LatencyEstimate {
    /// Read the meter's latest measurements
    ///
    /// Logs a warning the first time the input side turns out unmeasurable.
    pub fn measure(meter: &LatencyMeter, format: &StreamFormat, compensation_secs: f64) -> Self {
        if meter.claim_input_warning() {
            log::warn!(
                "Capture stream reports no timestamps; input latency counts as 0 ms, adjust latency compensation by ear"
            );
        }
        Self {
            input_secs: meter.input().as_secs_f64(),
            output_secs: meter.output().as_secs_f64() + format.base_latency_secs(),
            compensation_secs,
            input_unavailable: meter.input_unavailable(),
        }
    }

    /// Total latency; can be negative with a large negative compensation
    pub fn total_secs(&self) -> f64 {
        self.input_secs + self.output_secs + self.compensation_secs
    }

    /// Total latency in whole samples, never negative
    pub fn total_samples(&self, sample_rate: u32) -> u32 {
        to_samples(self.total_secs(), sample_rate)
    }

    /// `SetLatency` command for the engine
    ///
    /// The input share is the measured input latency; compensation lands in
    /// the output share so the two always add up to [`Self::total_samples`].
    pub fn to_command(&self, sample_rate: u32) -> EngineCommand {
        let total = self.total_samples(sample_rate);
        let input = to_samples(self.input_secs, sample_rate).min(total);
        EngineCommand::SetLatency {
            input_samples: input,
            output_samples: total - input,
        }
    }
}

fn to_samples(secs: f64, sample_rate: u32) -> u32 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * sample_rate as f64).floor().min(u32::MAX as f64) as u32
}
