//! Observable looper status

use std::fmt;

use super::latency::LatencyEstimate;
use crate::audio::{AudioError, ErrorCategory};
use crate::engine::EngineState;

/// State of the render context (both device streams together)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextState {
    /// Streams are running and the engine renders every block
    Running,
    /// Streams are paused; the engine keeps its loop
    Suspended,
    /// No streams (never started, failed or closed)
    #[default]
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContextState::Running => "running",
            ContextState::Suspended => "suspended",
            ContextState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// A control-plane failure as observers see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&AudioError> for StatusError {
    fn from(err: &AudioError) -> Self {
        Self {
            category: err.category(),
            message: err.user_message(),
        }
    }
}

/// Snapshot published to observers whenever anything changes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LooperStatus {
    pub state: EngineState,
    /// Position in the loop, `[0, 1)`
    pub progress: f32,
    /// Overdub layers currently on the stack
    pub layers: usize,
    pub latency: LatencyEstimate,
    /// Gain target last requested
    pub gain: f32,
    pub context: ContextState,
    /// Most recent categorized failure, cleared on the next success
    pub error: Option<StatusError>,
}

impl LooperStatus {
    /// Total latency estimate in seconds
    pub fn latency_secs(&self) -> f64 {
        self.latency.total_secs()
    }
}
