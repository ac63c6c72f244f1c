//! Audio host: devices, streams and the render graph
//!
//! Uses a lock-free architecture for real-time safety:
//! - The output callback owns the [`RenderGraph`] (and with it the loop engine)
//! - The capture callback hands samples over through an SPSC ring buffer
//! - The controller talks to the engine through the command queue only
//! - Latency measurements and engine state are read back through atomics
//!
//! [`CpalHost`] implements [`AudioHost`] on top of cpal; any other host
//! (tests use an in-memory one) plugs into the same controller.

mod backend;
pub mod config;
mod cpal_backend;
pub mod device;
mod error;
mod graph;

pub use backend::{AudioHost, AudioStream, CommandSender, StreamFormat};
pub use config::{AudioConfig, BufferSize, CaptureConstraints, DeviceId};
pub use cpal_backend::{CpalHost, CpalStream};
pub use device::{list_devices, AudioDevice, Direction};
pub use error::{AudioError, AudioResult, ErrorCategory};
pub use graph::{capture_channel, CaptureFeed, LatencyMeter, RenderGraph, CAPTURE_QUEUE_CAPACITY};
