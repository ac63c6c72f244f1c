//! Control plane of the looper
//!
//! [`EngineController`] builds the graph through an [`AudioHost`](crate::audio::AudioHost)
//! (capture, engine, output, in that order), then relays performer actions
//! into the engine's command queue. A background task drains engine events
//! into a [`LooperStatus`] that observers follow through a `tokio::sync::watch`
//! channel.
//!
//! Latency reaches the engine only as a `SetLatency` command pushed right
//! before each footswitch and after each successful resume.

mod cancel;
mod handle;
mod latency;
mod pump;
mod status;

pub use cancel::CancelToken;
pub use handle::EngineController;
pub use latency::LatencyEstimate;
pub use status::{ContextState, LooperStatus, StatusError};
