//! Lock-free message queues between the controller and the loop engine
//!
//! The controller pushes [`EngineCommand`]s, the audio thread drains them at
//! the start of every block and answers with [`EngineEvent`]s.
//!
//! # Why Lock-Free?
//!
//! The audio callback must never wait on the control plane:
//! - A mutex held by the controller while it logs or awaits I/O turns
//!   into a missed deadline on the audio thread
//! - A missed deadline is an audible click, or a gap in the recording
//!
//! `rtrb` ring buffers are allocated once, and both push and pop are
//! wait-free O(1). Each queue has exactly one producer and one consumer.
//!
//! # Ordering
//!
//! Commands are applied in FIFO order, one at a time. Footswitch, undo and
//! reset are never coalesced: two presses queued in the same block are two
//! transitions.

use super::EngineState;

/// Commands sent from the controller to the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────
    /// Advance the state machine (record → play → overdub → play ...)
    Footswitch,
    /// Remove the most recent overdub layer
    Undo,
    /// Discard everything and return to `Empty`
    Reset,

    // ─────────────────────────────────────────────────────────────
    // Latency
    // ─────────────────────────────────────────────────────────────
    /// Replace the read offset used from the next block on
    SetLatency {
        input_samples: u32,
        output_samples: u32,
    },
}

/// Notifications sent from the audio thread back to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// The engine entered a new state
    SetState(EngineState),
    /// Playhead position as a fraction of the loop length, in `[0, 1)`
    SetProgress(f32),
}

/// Capacity of the command queue
///
/// A performer can't press a pedal fast enough to fill this between two
/// audio blocks.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the event queue
///
/// Sized for several seconds of progress reports at the shortest interval in
/// case the event pump stalls.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Create a new command channel (producer/consumer pair)
///
/// Returns `(Producer, Consumer)` where:
/// - Producer: owned by the controller
/// - Consumer: owned by the render graph on the audio thread
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Create a new event channel (producer/consumer pair)
///
/// The producer lives inside the [`LoopEngine`](super::LoopEngine), the
/// consumer in the controller's event pump.
pub fn event_channel() -> (rtrb::Producer<EngineEvent>, rtrb::Consumer<EngineEvent>) {
    rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY)
}
