//! Audio host abstraction
//!
//! The controller builds the graph through the [`AudioHost`] trait so the
//! setup sequence (negotiate → capture → output → start) is the same for the
//! cpal backend and for the in-memory host used in tests.
//!
//! Streams are returned as boxed [`AudioStream`]s. Dropping one closes it;
//! platform streams are usually not `Send`, so neither are these boxes.

use std::sync::Arc;

use super::config::{AudioConfig, CaptureConstraints};
use super::error::AudioResult;
use super::graph::{CaptureFeed, LatencyMeter, RenderGraph};
use crate::engine::EngineCommand;

/// Format agreed between the capture and output devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Shared sample rate of both streams (Hz)
    pub sample_rate: u32,
    /// Requested block size (frames)
    pub buffer_size: u32,
    /// Channels delivered by the capture device (mixed down to mono)
    pub input_channels: u16,
    /// Channels expected by the output device (mono copied to each)
    pub output_channels: u16,
}

impl StreamFormat {
    /// Latency contributed by one output block, in seconds
    pub fn base_latency_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.buffer_size as f64 / self.sample_rate as f64
    }
}

/// A running (or paused) device stream
///
/// Dropping the value releases the device.
pub trait AudioStream {
    /// Start or resume the stream
    fn play(&mut self) -> AudioResult<()>;
    /// Suspend the stream without releasing the device
    fn pause(&mut self) -> AudioResult<()>;
}

/// Backend able to open the two halves of the looper graph
pub trait AudioHost {
    /// Pick devices and agree on a format; nothing is opened yet
    fn negotiate(
        &mut self,
        config: &AudioConfig,
        constraints: &CaptureConstraints,
    ) -> AudioResult<StreamFormat>;

    /// Open the capture stream, paused, feeding `feed`
    ///
    /// Failures must be capture-categorized errors.
    fn open_capture(
        &mut self,
        format: &StreamFormat,
        feed: CaptureFeed,
    ) -> AudioResult<Box<dyn AudioStream>>;

    /// Open the output stream, paused, rendering `graph`
    fn open_output(
        &mut self,
        format: &StreamFormat,
        graph: RenderGraph,
        meter: Arc<LatencyMeter>,
    ) -> AudioResult<Box<dyn AudioStream>>;
}

/// Command sender for the control plane
///
/// Wraps the lock-free producer for sending [`EngineCommand`]s to the audio
/// thread. All operations are non-blocking.
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self { producer }
    }

    /// Send a command to the engine (non-blocking)
    ///
    /// Returns `Err(cmd)` if the queue is full.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Whether the audio thread dropped its end of the queue
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}
