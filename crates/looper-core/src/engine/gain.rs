//! Post-engine gain with a short linear ramp
//!
//! The controller publishes a target through [`GainParam`] (an atomic, no
//! queue involved). At the start of each block the [`GainStage`] picks the
//! target up and, if it changed, ramps towards it over a fixed number of
//! samples so level changes never click.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Sample;

/// Gain target shared between the controller and the audio thread
///
/// Stored as the bit pattern of an `f32` in an `AtomicU32`.
#[derive(Debug)]
pub struct GainParam {
    target_bits: AtomicU32,
}

impl GainParam {
    pub fn new(initial: f32) -> Self {
        Self {
            target_bits: AtomicU32::new(sanitize(initial).to_bits()),
        }
    }

    /// Publish a new target (negative and NaN values become 0.0)
    pub fn set(&self, value: f32) {
        self.target_bits
            .store(sanitize(value).to_bits(), Ordering::Relaxed);
    }

    /// Current target (lock-free)
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.target_bits.load(Ordering::Relaxed))
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

/// Ramped gain applied to the engine output on the audio thread
pub struct GainStage {
    param: std::sync::Arc<GainParam>,
    current: f32,
    target: f32,
    step: f32,
    remaining: usize,
    ramp_samples: usize,
}

impl GainStage {
    /// Create a stage that starts at the parameter's current target
    ///
    /// A `ramp_samples` of 0 applies new targets immediately.
    pub fn new(param: std::sync::Arc<GainParam>, ramp_samples: usize) -> Self {
        let initial = param.get();
        Self {
            param,
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_samples,
        }
    }

    /// Scale `buffer` in place, advancing any ramp in progress
    pub fn process(&mut self, buffer: &mut [Sample]) {
        let requested = self.param.get();
        if requested != self.target {
            self.target = requested;
            if self.ramp_samples == 0 {
                self.current = requested;
                self.remaining = 0;
            } else {
                self.remaining = self.ramp_samples;
                self.step = (requested - self.current) / self.ramp_samples as f32;
            }
        }

        if self.remaining == 0 {
            let gain = self.current;
            if gain != 1.0 {
                for sample in buffer.iter_mut() {
                    *sample *= gain;
                }
            }
            return;
        }

        for sample in buffer.iter_mut() {
            if self.remaining > 0 {
                self.remaining -= 1;
                self.current = if self.remaining == 0 {
                    self.target
                } else {
                    self.current + self.step
                };
            }
            *sample *= self.current;
        }
    }
}
