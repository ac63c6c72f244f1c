//! Render graph: capture queue → loop engine → gain → device frames
//!
//! ```text
//! ┌─────────────────┐  mono samples   ┌───────────────────────────────────────┐
//! │ Capture stream  │────push()──────►│ Output stream callback                │
//! │ (input thread)  │   (SPSC ring)   │  RenderGraph::render_interleaved()    │
//! └────────┬────────┘                 │   1. pull one block of capture        │
//!          │                          │   2. drain EngineCommands             │
//!          │ capture timestamps       │   3. LoopEngine::process              │
//!          ▼                          │   4. GainStage::process               │
//! ┌─────────────────┐  playback ts    │   5. copy mono to every channel       │
//! │  LatencyMeter   │◄────────────────└───────────────────────────────────────┘
//! └─────────────────┘
//! ```
//!
//! The output stream owns the graph outright; the capture stream only shares
//! the ring buffer with it. Neither side ever waits for the other: a starved
//! capture queue reads as silence, a full one drops the newest samples.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::config::MAX_BUFFER_SIZE;
use crate::engine::{EngineCommand, GainStage, LoopEngine};
use crate::types::{MonoBuffer, Sample};

/// Capacity of the capture ring buffer (samples)
pub const CAPTURE_QUEUE_CAPACITY: usize = MAX_BUFFER_SIZE * 4;

/// Capture backlog, in blocks, beyond which the oldest samples are skipped
///
/// Keeps clock drift between two devices from building up as hidden input
/// latency.
const MAX_CAPTURE_BACKLOG_BLOCKS: usize = 3;

/// Latency measured by the stream callbacks
///
/// Written from the audio threads, read by the controller when it builds a
/// latency estimate.
#[derive(Debug, Default)]
pub struct LatencyMeter {
    input_nanos: AtomicU64,
    output_nanos: AtomicU64,
    /// The last capture callback carried no usable timestamp
    input_unavailable: AtomicBool,
    input_warned: AtomicBool,
}

impl LatencyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time between the device capturing a block and the callback seeing it
    #[inline]
    pub fn record_input(&self, latency: Duration) {
        self.input_nanos
            .store(latency.as_nanos() as u64, Ordering::Relaxed);
        self.input_unavailable.store(false, Ordering::Relaxed);
    }

    /// The capture callback could not compute its latency
    ///
    /// The last measured value (0 if none) stays in place.
    #[inline]
    pub fn mark_input_unavailable(&self) {
        self.input_unavailable.store(true, Ordering::Relaxed);
    }

    /// Whether the input share is a default rather than a measurement
    pub fn input_unavailable(&self) -> bool {
        self.input_unavailable.load(Ordering::Relaxed)
    }

    /// True exactly once, the first time this is asked while input latency
    /// is unavailable
    pub fn claim_input_warning(&self) -> bool {
        self.input_unavailable() && !self.input_warned.swap(true, Ordering::Relaxed)
    }

    /// Time between the output callback and the block reaching the speaker
    #[inline]
    pub fn record_output(&self, latency: Duration) {
        self.output_nanos
            .store(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn input(&self) -> Duration {
        Duration::from_nanos(self.input_nanos.load(Ordering::Relaxed))
    }

    pub fn output(&self) -> Duration {
        Duration::from_nanos(self.output_nanos.load(Ordering::Relaxed))
    }
}

/// Producer side of the capture queue, owned by the capture stream callback
pub struct CaptureFeed {
    producer: rtrb::Producer<Sample>,
    meter: Arc<LatencyMeter>,
}

impl CaptureFeed {
    pub fn meter(&self) -> &LatencyMeter {
        &self.meter
    }

    /// Mix interleaved device frames down to mono and queue them
    ///
    /// Frames that don't fit are dropped.
    pub fn push_interleaved<T, F>(&mut self, data: &[T], channels: usize, to_sample: F)
    where
        T: Copy,
        F: Fn(T) -> Sample,
    {
        let channels = channels.max(1);
        let scale = 1.0 / channels as Sample;
        for frame in data.chunks(channels) {
            let mono = if channels == 1 {
                to_sample(frame[0])
            } else {
                frame.iter().map(|&s| to_sample(s)).sum::<Sample>() * scale
            };
            if self.producer.push(mono).is_err() {
                break;
            }
        }
    }
}

/// Create the capture queue
///
/// Returns the feed for the capture callback and the consumer for the
/// render graph.
pub fn capture_channel(meter: Arc<LatencyMeter>) -> (CaptureFeed, rtrb::Consumer<Sample>) {
    let (producer, consumer) = rtrb::RingBuffer::new(CAPTURE_QUEUE_CAPACITY);
    (CaptureFeed { producer, meter }, consumer)
}

/// Everything the output callback needs to render a block
pub struct RenderGraph {
    engine: LoopEngine,
    commands: rtrb::Consumer<EngineCommand>,
    capture: rtrb::Consumer<Sample>,
    gain: GainStage,
    input: MonoBuffer,
    output: MonoBuffer,
}

impl RenderGraph {
    pub fn new(
        engine: LoopEngine,
        commands: rtrb::Consumer<EngineCommand>,
        capture: rtrb::Consumer<Sample>,
        gain: GainStage,
    ) -> Self {
        Self {
            engine,
            commands,
            capture,
            gain,
            input: MonoBuffer::silence(MAX_BUFFER_SIZE),
            output: MonoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    pub fn engine(&self) -> &LoopEngine {
        &self.engine
    }

    /// Render up to [`MAX_BUFFER_SIZE`] mono frames
    pub fn render_block(&mut self, frames: usize) -> &[Sample] {
        let frames = frames.min(MAX_BUFFER_SIZE);
        self.input.set_len_from_capacity(frames);
        self.output.set_len_from_capacity(frames);

        self.pull_capture();
        self.engine.process_commands(&mut self.commands);
        self.engine
            .process(self.input.as_slice(), self.output.as_mut_slice());
        self.gain.process(self.output.as_mut_slice());

        self.output.as_slice()
    }

    /// Fill an interleaved device buffer, mono copied to every channel
    pub fn render_interleaved<T, F>(&mut self, data: &mut [T], channels: usize, from_sample: F)
    where
        T: Copy,
        F: Fn(Sample) -> T,
    {
        let channels = channels.max(1);
        for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
            let frames = chunk.len() / channels;
            let rendered = self.render_block(frames);
            for (i, frame) in chunk.chunks_mut(channels).enumerate() {
                let value = from_sample(rendered.get(i).copied().unwrap_or(0.0));
                for slot in frame.iter_mut() {
                    *slot = value;
                }
            }
        }
    }

    /// Move one block of capture into the input buffer
    fn pull_capture(&mut self) {
        let frames = self.input.len();
        let backlog = self.capture.slots();
        if frames > 0 && backlog > frames * MAX_CAPTURE_BACKLOG_BLOCKS {
            if let Ok(chunk) = self.capture.read_chunk(backlog - frames) {
                chunk.commit_all();
            }
        }

        for sample in self.input.as_mut_slice() {
            *sample = self.capture.pop().unwrap_or(0.0);
        }
    }
}
