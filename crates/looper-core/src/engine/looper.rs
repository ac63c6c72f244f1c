//! The loop engine: base buffer, overdub layers and the state machine
//!
//! Owned exclusively by the audio thread. The render graph calls
//! [`LoopEngine::process_commands`] and then [`LoopEngine::process`] once per
//! block; everything below is sample-exact bookkeeping.
//!
//! # Per-sample behaviour
//!
//! | State           | Output                               | Input                                |
//! |-----------------|--------------------------------------|--------------------------------------|
//! | `Empty`         | silence                              | ignored                              |
//! | `InitRecording` | silence                              | appended to the base buffer          |
//! | `Playing`       | base + layers at `playhead + offset` | ignored                              |
//! | `Overdubbing`   | base + layers at `playhead + offset` | added to the newest layer at `playhead` |
//!
//! The latency offset shifts reads only. Writes land where the performer
//! heard the loop, which is already `offset` samples behind the read head.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use super::command::{EngineCommand, EngineEvent};
use super::layers::LayerStack;
use super::state::EngineState;
use crate::types::Sample;

/// Largest progress value ever reported (the last `f32` below 1.0)
pub const MAX_PROGRESS: f32 = 1.0 - f32::EPSILON / 2.0;

/// Construction-time options, all in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Capacity of the base buffer (longest recordable loop)
    pub buffer_capacity_samples: usize,
    /// Samples between two progress reports
    pub update_progress_interval_samples: usize,
    /// Size of the overdub arena shared by all layers
    pub overdub_arena_samples: usize,
    /// Upper bound on simultaneously kept overdub layers
    pub max_overdub_layers: usize,
}

impl EngineOptions {
    /// Derive sample counts from durations at `sample_rate`
    pub fn from_seconds(
        sample_rate: u32,
        max_recording_seconds: f64,
        update_progress_interval_seconds: f64,
        overdub_arena_seconds: f64,
        max_overdub_layers: usize,
    ) -> Self {
        let to_samples = |secs: f64| (secs.max(0.0) * sample_rate as f64).floor() as usize;
        Self {
            buffer_capacity_samples: to_samples(max_recording_seconds),
            update_progress_interval_samples: to_samples(update_progress_interval_seconds),
            overdub_arena_samples: to_samples(overdub_arena_seconds),
            max_overdub_layers,
        }
        .normalized()
    }

    /// Raise every field to its minimum usable value
    ///
    /// The arena always holds at least one full-capacity layer.
    pub fn normalized(self) -> Self {
        let buffer_capacity_samples = self.buffer_capacity_samples.max(1);
        Self {
            buffer_capacity_samples,
            update_progress_interval_samples: self.update_progress_interval_samples.max(1),
            overdub_arena_samples: self.overdub_arena_samples.max(buffer_capacity_samples),
            max_overdub_layers: self.max_overdub_layers.max(1),
        }
    }
}

/// Atomic engine snapshot for lock-free reads from the control plane
///
/// State and layer count are stored the moment they change, before the
/// matching event is pushed, so a reader that has seen an event never reads
/// an older value here. Loop length and playhead are stored once per block.
/// All stores are `Relaxed`.
#[derive(Debug, Default)]
pub struct LoopAtomics {
    state: AtomicU8,
    loop_length: AtomicU64,
    playhead: AtomicU64,
    layer_count: AtomicUsize,
    /// Events lost because the event queue was full
    dropped_events: AtomicU64,
}

impl LoopAtomics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn loop_length(&self) -> u64 {
        self.loop_length.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn playhead(&self) -> u64 {
        self.playhead.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layer_count.load(Ordering::Relaxed)
    }

    /// Running count of events the engine could not queue
    #[inline]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

/// Single-track loop engine
pub struct LoopEngine {
    /// Base loop, allocated at full capacity
    buffer: Vec<Sample>,
    /// Valid samples in `buffer`; frozen on leaving `InitRecording`
    loop_length: usize,
    playhead: usize,
    state: EngineState,
    layers: LayerStack,
    /// The playhead wrapped while overdubbing; the next written sample opens a layer
    pass_pending: bool,

    input_latency: usize,
    output_latency: usize,
    /// Read offset in effect for the current block
    block_offset: usize,

    update_progress_interval: usize,
    progress_counter: usize,

    events: rtrb::Producer<EngineEvent>,
    atomics: Arc<LoopAtomics>,
}

impl LoopEngine {
    /// Allocate the base buffer and overdub arena (control thread only)
    pub fn new(options: EngineOptions, events: rtrb::Producer<EngineEvent>) -> Self {
        let options = options.normalized();
        log::debug!(
            "LoopEngine: capacity {} samples, arena {} samples, up to {} layers, progress every {} samples",
            options.buffer_capacity_samples,
            options.overdub_arena_samples,
            options.max_overdub_layers,
            options.update_progress_interval_samples
        );
        Self {
            buffer: vec![0.0; options.buffer_capacity_samples],
            loop_length: 0,
            playhead: 0,
            state: EngineState::Empty,
            layers: LayerStack::new(options.overdub_arena_samples, options.max_overdub_layers),
            pass_pending: false,
            input_latency: 0,
            output_latency: 0,
            block_offset: 0,
            update_progress_interval: options.update_progress_interval_samples,
            progress_counter: 0,
            events,
            atomics: Arc::new(LoopAtomics::new()),
        }
    }

    /// Shared snapshot of the engine state for the control plane
    pub fn atomics(&self) -> Arc<LoopAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn loop_length(&self) -> usize {
        self.loop_length
    }

    pub fn playhead(&self) -> usize {
        self.playhead
    }

    /// Number of overdub layers on the stack
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Read offset the next block will use
    #[cfg(test)]
    pub(crate) fn latency_offset(&self) -> usize {
        self.input_latency + self.output_latency
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════════

    /// Drain every pending command in FIFO order
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.handle_command(cmd);
        }
    }

    /// Apply a single command; invalid sequencing is a silent no-op
    pub fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Footswitch => self.footswitch(),
            EngineCommand::Undo => self.undo(),
            EngineCommand::Reset => self.reset(),
            EngineCommand::SetLatency {
                input_samples,
                output_samples,
            } => {
                self.input_latency = input_samples as usize;
                self.output_latency = output_samples as usize;
            }
        }
    }

    fn footswitch(&mut self) {
        match self.state {
            EngineState::Empty => {
                self.loop_length = 0;
                self.playhead = 0;
                self.set_state(EngineState::InitRecording);
            }
            EngineState::InitRecording => {
                if self.loop_length > 0 {
                    self.start_playing();
                }
            }
            EngineState::Playing => {
                self.layers.push(self.playhead);
                self.publish_layers();
                self.set_state(EngineState::Overdubbing);
            }
            EngineState::Overdubbing => {
                self.pass_pending = false;
                self.set_state(EngineState::Playing);
            }
        }
    }

    fn undo(&mut self) {
        if !self.state.is_looping() {
            return;
        }
        if self.layers.pop() {
            self.publish_layers();
            self.pass_pending = false;
            self.set_state(EngineState::Playing);
        }
    }

    /// Return to `Empty` in constant time
    ///
    /// The base buffer is cleared logically: nothing past `loop_length` is
    /// ever read, and the next recording overwrites each position before the
    /// loop length grows over it.
    fn reset(&mut self) {
        self.layers.clear();
        self.publish_layers();
        self.pass_pending = false;
        self.loop_length = 0;
        self.playhead = 0;
        self.progress_counter = 0;
        self.set_state(EngineState::Empty);
    }

    /// Freeze the loop length and start looping from the top
    fn start_playing(&mut self) {
        self.playhead = 0;
        self.layers.configure(self.loop_length);
        self.publish_layers();
        self.set_state(EngineState::Playing);
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.atomics.state.store(state.as_u8(), Ordering::Relaxed);
        self.emit(EngineEvent::SetState(state));
    }

    /// Push an event; if the control plane stopped draining, the event is
    /// dropped and counted
    #[inline]
    fn emit(&mut self, event: EngineEvent) {
        if self.events.push(event).is_err() {
            self.atomics.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    fn publish_layers(&self) {
        self.atomics
            .layer_count
            .store(self.layers.len(), Ordering::Relaxed);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Audio
    // ═══════════════════════════════════════════════════════════════════════

    /// Render one block
    ///
    /// `output.len()` is the block size. Missing input samples (a short
    /// `input`) are treated as silence.
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        self.block_offset = self.input_latency + self.output_latency;

        for (i, out) in output.iter_mut().enumerate() {
            let x = input.get(i).copied().unwrap_or(0.0);
            *out = match self.state {
                EngineState::Empty => 0.0,
                EngineState::InitRecording => {
                    self.record(x);
                    0.0
                }
                EngineState::Playing => {
                    let y = self.read();
                    self.advance();
                    y
                }
                EngineState::Overdubbing => {
                    let y = self.read();
                    if self.pass_pending {
                        self.pass_pending = false;
                        self.layers.push(self.playhead);
                        self.publish_layers();
                    }
                    self.layers.accumulate(self.playhead, x);
                    self.advance();
                    if self.playhead == 0 {
                        self.pass_pending = true;
                    }
                    y
                }
            };
        }

        self.report_progress(output.len());
        self.publish_atomics();
    }

    #[inline]
    fn record(&mut self, x: Sample) {
        if self.loop_length < self.buffer.len() {
            self.buffer[self.loop_length] = x;
            self.loop_length += 1;
        }
        if self.loop_length == self.buffer.len() {
            self.start_playing();
        }
    }

    #[inline]
    fn read(&self) -> Sample {
        let pos = (self.playhead + self.block_offset) % self.loop_length;
        self.buffer[pos] + self.layers.sum_at(pos)
    }

    #[inline]
    fn advance(&mut self) {
        self.playhead += 1;
        if self.playhead == self.loop_length {
            self.playhead = 0;
        }
    }

    fn report_progress(&mut self, frames: usize) {
        self.progress_counter += frames;
        if self.progress_counter >= self.update_progress_interval && self.loop_length > 0 {
            let progress = (self.playhead as f64 / self.loop_length as f64) as f32;
            self.emit(EngineEvent::SetProgress(progress.min(MAX_PROGRESS)));
            self.progress_counter %= self.update_progress_interval;
        }
    }

    fn publish_atomics(&self) {
        let a = &self.atomics;
        a.state.store(self.state.as_u8(), Ordering::Relaxed);
        a.loop_length
            .store(self.loop_length as u64, Ordering::Relaxed);
        a.playhead.store(self.playhead as u64, Ordering::Relaxed);
        a.layer_count.store(self.layers.len(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::event_channel;

    fn options(capacity: usize) -> EngineOptions {
        EngineOptions {
            buffer_capacity_samples: capacity,
            update_progress_interval_samples: 1_000_000,
            overdub_arena_samples: capacity * 8,
            max_overdub_layers: 8,
        }
    }

    fn new_engine(capacity: usize) -> (LoopEngine, rtrb::Consumer<EngineEvent>) {
        let (tx, rx) = event_channel();
        (LoopEngine::new(options(capacity), tx), rx)
    }

    fn drain(rx: &mut rtrb::Consumer<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.pop() {
            events.push(event);
        }
        events
    }

    fn states(rx: &mut rtrb::Consumer<EngineEvent>) -> Vec<EngineState> {
        drain(rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::SetState(s) => Some(s),
                EngineEvent::SetProgress(_) => None,
            })
            .collect()
    }

    /// Record `samples` and close the loop with a footswitch
    fn record_loop(engine: &mut LoopEngine, samples: &[Sample]) {
        engine.handle_command(EngineCommand::Footswitch);
        let mut out = vec![0.0; samples.len()];
        engine.process(samples, &mut out);
        engine.handle_command(EngineCommand::Footswitch);
    }

    fn play(engine: &mut LoopEngine, frames: usize) -> Vec<Sample> {
        let input = vec![0.0; frames];
        let mut out = vec![0.0; frames];
        engine.process(&input, &mut out);
        out
    }

    #[test]
    fn test_footswitch_trace_from_empty() {
        let (mut engine, mut rx) = new_engine(64);
        assert_eq!(engine.state(), EngineState::Empty);

        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(engine.state(), EngineState::InitRecording);

        // Nothing captured yet: closing the loop is ignored
        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(engine.state(), EngineState::InitRecording);

        play(&mut engine, 4);
        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(engine.playhead(), 0);

        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(engine.state(), EngineState::Overdubbing);
        assert_eq!(engine.layer_count(), 1);

        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(engine.layer_count(), 1);

        assert_eq!(
            states(&mut rx),
            vec![
                EngineState::InitRecording,
                EngineState::Playing,
                EngineState::Overdubbing,
                EngineState::Playing,
            ]
        );
    }

    #[test]
    fn test_scenario_a_recorded_ones_play_back() {
        let (mut engine, _rx) = new_engine(48_000);
        record_loop(&mut engine, &vec![1.0; 1000]);
        assert_eq!(engine.loop_length(), 1000);

        let out = play(&mut engine, 1000);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_recording_reproduces_input_exactly() {
        let (mut engine, _rx) = new_engine(1024);
        let input: Vec<Sample> = (0..300).map(|i| (i as f32 * 0.37).sin()).collect();
        record_loop(&mut engine, &input);

        assert_eq!(play(&mut engine, 300), input);
        // And again on the next pass
        assert_eq!(play(&mut engine, 300), input);
    }

    #[test]
    fn test_output_silent_while_recording() {
        let (mut engine, _rx) = new_engine(64);
        engine.handle_command(EngineCommand::Footswitch);
        let input = [0.9; 16];
        let mut out = [1.0; 16];
        engine.process(&input, &mut out);
        assert_eq!(out, [0.0; 16]);
        assert_eq!(engine.loop_length(), 16);
    }

    #[test]
    fn test_scenario_b_overdub_adds_to_base() {
        let (mut engine, _rx) = new_engine(16);
        let base = [0.1, 0.2, 0.3, 0.4];
        record_loop(&mut engine, &base);

        engine.handle_command(EngineCommand::Footswitch);
        let mut out = [0.0; 4];
        engine.process(&[0.5; 4], &mut out);
        // The first pass hears only the base
        assert_eq!(out, base);
        engine.handle_command(EngineCommand::Footswitch);

        let out = play(&mut engine, 4);
        for (got, b) in out.iter().zip(base) {
            assert!((got - (b + 0.5)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_scenario_c_undo_restores_base() {
        let (mut engine, mut rx) = new_engine(16);
        let base = [0.1, 0.2, 0.3, 0.4];
        record_loop(&mut engine, &base);

        engine.handle_command(EngineCommand::Footswitch);
        let mut out = [0.0; 4];
        engine.process(&[0.5; 4], &mut out);
        engine.handle_command(EngineCommand::Footswitch);
        drain(&mut rx);

        engine.handle_command(EngineCommand::Undo);
        assert_eq!(engine.layer_count(), 0);
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(play(&mut engine, 4), base);
    }

    #[test]
    fn test_scenario_d_capacity_forces_playing() {
        let (mut engine, mut rx) = new_engine(32);
        engine.handle_command(EngineCommand::Footswitch);

        // Feed more than capacity in a single block
        let input: Vec<Sample> = (0..40).map(|i| i as f32).collect();
        let mut out = vec![0.0; 40];
        engine.process(&input, &mut out);

        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(engine.loop_length(), 32);
        // No sample was dropped: the rest of the block already plays the loop
        assert_eq!(&out[..32], &[0.0; 32][..]);
        assert_eq!(&out[32..], &input[..8]);
        assert_eq!(
            states(&mut rx),
            vec![EngineState::InitRecording, EngineState::Playing]
        );
    }

    #[test]
    fn test_scenario_e_latency_offset_shifts_reads() {
        let (mut engine, _rx) = new_engine(16);
        record_loop(&mut engine, &[1.0, 2.0, 3.0, 4.0]);
        engine.handle_command(EngineCommand::SetLatency {
            input_samples: 1,
            output_samples: 1,
        });
        assert_eq!(engine.latency_offset(), 2);
        assert_eq!(play(&mut engine, 6), vec![3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_overdub_writes_at_unshifted_playhead() {
        let (mut engine, _rx) = new_engine(16);
        record_loop(&mut engine, &[0.0; 4]);
        engine.handle_command(EngineCommand::SetLatency {
            input_samples: 0,
            output_samples: 1,
        });

        engine.handle_command(EngineCommand::Footswitch);
        let mut out = [0.0; 4];
        engine.process(&[1.0, 0.0, 0.0, 0.0], &mut out);
        engine.handle_command(EngineCommand::Footswitch);

        // Written at position 0, read back one sample early
        assert_eq!(play(&mut engine, 4), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_loop_length_frozen_until_reset() {
        let (mut engine, _rx) = new_engine(64);
        record_loop(&mut engine, &[0.5; 10]);
        let frozen = engine.loop_length();

        for cmd in [
            EngineCommand::Footswitch,
            EngineCommand::Footswitch,
            EngineCommand::Undo,
            EngineCommand::Footswitch,
        ] {
            engine.handle_command(cmd);
            engine.process(&[0.1; 7], &mut [0.0; 7]);
            assert_eq!(engine.loop_length(), frozen);
        }

        engine.handle_command(EngineCommand::Reset);
        assert_eq!(engine.loop_length(), 0);
    }

    #[test]
    fn test_playhead_stays_in_range() {
        let (mut engine, _rx) = new_engine(64);
        record_loop(&mut engine, &[0.0; 7]);
        engine.handle_command(EngineCommand::Footswitch);
        for block in [1, 3, 5, 7, 11, 13] {
            engine.process(&vec![0.2; block], &mut vec![0.0; block]);
            assert!(engine.playhead() < engine.loop_length());
        }
    }

    #[test]
    fn test_undo_without_layers_changes_nothing() {
        let (mut engine, mut rx) = new_engine(16);
        record_loop(&mut engine, &[0.1, 0.2, 0.3]);
        drain(&mut rx);

        engine.handle_command(EngineCommand::Undo);
        assert_eq!(engine.state(), EngineState::Playing);
        assert!(states(&mut rx).is_empty());
        assert_eq!(play(&mut engine, 3), vec![0.1, 0.2, 0.3]);

        // Also ignored before a loop exists
        let (mut empty, mut rx) = new_engine(16);
        empty.handle_command(EngineCommand::Undo);
        assert_eq!(empty.state(), EngineState::Empty);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_undo_while_overdubbing_returns_to_playing() {
        let (mut engine, _rx) = new_engine(16);
        record_loop(&mut engine, &[0.0; 4]);
        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&[1.0; 2], &mut [0.0; 2]);

        engine.handle_command(EngineCommand::Undo);
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(engine.layer_count(), 0);
        assert_eq!(play(&mut engine, 4), vec![0.0; 4]);
    }

    #[test]
    fn test_overdub_wrap_pushes_layer_per_pass() {
        let (mut engine, _rx) = new_engine(16);
        record_loop(&mut engine, &[0.0; 4]);
        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&[0.25; 8], &mut [0.0; 8]);

        // Two completed passes; the third opens with its first sample
        assert_eq!(engine.layer_count(), 2);
        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(engine.layer_count(), 2);
        let out = play(&mut engine, 4);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));

        // Undo peels one pass at a time
        engine.handle_command(EngineCommand::Undo);
        assert_eq!(engine.layer_count(), 1);
        let out = play(&mut engine, 4);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_layer_cap_folds_passes_into_newest_layer() {
        let (tx, _rx) = event_channel();
        let mut engine = LoopEngine::new(
            EngineOptions {
                buffer_capacity_samples: 6,
                update_progress_interval_samples: 1000,
                overdub_arena_samples: 8,
                max_overdub_layers: 8,
            },
            tx,
        );
        record_loop(&mut engine, &[0.0; 4]);
        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&[0.25; 16], &mut [0.0; 16]);

        // Arena holds two loop-length slots
        assert_eq!(engine.layer_count(), 2);
        engine.handle_command(EngineCommand::Footswitch);
        let out = play(&mut engine, 4);
        assert!(out.iter().all(|&s| (s - 1.0).abs() < 1e-6));

        engine.handle_command(EngineCommand::Undo);
        let out = play(&mut engine, 4);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_reset_returns_to_empty_and_silence() {
        let (mut engine, mut rx) = new_engine(16);
        record_loop(&mut engine, &[1.0; 8]);
        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&[1.0; 3], &mut [0.0; 3]);
        drain(&mut rx);

        engine.handle_command(EngineCommand::Reset);
        assert_eq!(engine.state(), EngineState::Empty);
        assert_eq!(engine.loop_length(), 0);
        assert_eq!(engine.playhead(), 0);
        assert_eq!(engine.layer_count(), 0);
        assert_eq!(states(&mut rx), vec![EngineState::Empty]);
        assert_eq!(play(&mut engine, 8), vec![0.0; 8]);

        // A fresh recording starts clean
        record_loop(&mut engine, &[0.5; 2]);
        assert_eq!(play(&mut engine, 4), vec![0.5; 4]);
    }

    #[test]
    fn test_commands_apply_in_order_without_coalescing() {
        let (mut engine, mut rx) = new_engine(16);
        let (mut tx, mut cmd_rx) = crate::engine::command_channel();

        tx.push(EngineCommand::Footswitch).unwrap();
        engine.process_commands(&mut cmd_rx);
        engine.process(&[0.3; 4], &mut [0.0; 4]);

        // Close the loop and start overdubbing within one block
        tx.push(EngineCommand::Footswitch).unwrap();
        tx.push(EngineCommand::Footswitch).unwrap();
        engine.process_commands(&mut cmd_rx);

        assert_eq!(engine.state(), EngineState::Overdubbing);
        assert_eq!(
            states(&mut rx),
            vec![
                EngineState::InitRecording,
                EngineState::Playing,
                EngineState::Overdubbing
            ]
        );
    }

    #[test]
    fn test_progress_reports_fraction_at_interval() {
        let (tx, mut rx) = event_channel();
        let mut engine = LoopEngine::new(
            EngineOptions {
                buffer_capacity_samples: 64,
                update_progress_interval_samples: 8,
                overdub_arena_samples: 64,
                max_overdub_layers: 1,
            },
            tx,
        );

        // No progress while nothing is recorded
        engine.process(&[0.0; 16], &mut [0.0; 16]);
        assert!(drain(&mut rx).is_empty());

        record_loop(&mut engine, &[0.0; 16]);
        drain(&mut rx);

        engine.process(&[0.0; 4], &mut [0.0; 4]);
        engine.process(&[0.0; 4], &mut [0.0; 4]);
        assert_eq!(drain(&mut rx), vec![EngineEvent::SetProgress(0.5)]);

        // Counter keeps the remainder after a report
        engine.process(&[0.0; 12], &mut [0.0; 12]);
        assert_eq!(drain(&mut rx), vec![EngineEvent::SetProgress(0.25)]);
        engine.process(&[0.0; 4], &mut [0.0; 4]);
        assert_eq!(drain(&mut rx), vec![EngineEvent::SetProgress(0.5)]);
    }

    #[test]
    fn test_progress_never_reaches_one() {
        let huge = 20_000_000usize;
        let progress = ((huge - 1) as f64 / huge as f64) as f32;
        assert!(progress.min(MAX_PROGRESS) < 1.0);
    }

    #[test]
    fn test_atomics_follow_engine() {
        let (mut engine, _rx) = new_engine(16);
        let atomics = engine.atomics();
        record_loop(&mut engine, &[0.0; 5]);
        play(&mut engine, 2);

        assert_eq!(atomics.state(), EngineState::Playing);
        assert_eq!(atomics.loop_length(), 5);
        assert_eq!(atomics.playhead(), 2);
        assert_eq!(atomics.layer_count(), 0);
    }

    #[test]
    fn test_shorter_recording_after_reset_never_plays_old_loop() {
        let (mut engine, _rx) = new_engine(32);
        record_loop(&mut engine, &[1.0; 24]);
        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&[1.0; 30], &mut [0.0; 30]);
        engine.handle_command(EngineCommand::Reset);

        record_loop(&mut engine, &[0.25; 5]);
        assert_eq!(engine.loop_length(), 5);
        assert_eq!(play(&mut engine, 40), vec![0.25; 40]);

        // Same again with a read offset that reaches across the old region
        engine.handle_command(EngineCommand::SetLatency {
            input_samples: 3,
            output_samples: 4,
        });
        assert_eq!(play(&mut engine, 40), vec![0.25; 40]);
    }

    #[test]
    fn test_atomics_store_state_before_the_block_runs() {
        let (mut engine, mut rx) = new_engine(16);
        let atomics = engine.atomics();
        let (mut tx, mut cmd_rx) = crate::engine::command_channel();

        tx.push(EngineCommand::Footswitch).unwrap();
        engine.process_commands(&mut cmd_rx);
        assert_eq!(states(&mut rx), vec![EngineState::InitRecording]);
        assert_eq!(atomics.state(), EngineState::InitRecording);

        engine.process(&[0.0; 4], &mut [0.0; 4]);
        tx.push(EngineCommand::Footswitch).unwrap();
        tx.push(EngineCommand::Footswitch).unwrap();
        engine.process_commands(&mut cmd_rx);
        assert_eq!(atomics.state(), EngineState::Overdubbing);
        assert_eq!(atomics.layer_count(), 1);

        tx.push(EngineCommand::Undo).unwrap();
        engine.process_commands(&mut cmd_rx);
        assert_eq!(atomics.state(), EngineState::Playing);
        assert_eq!(atomics.layer_count(), 0);
    }

    #[test]
    fn test_full_event_queue_counts_dropped_events() {
        let (tx, mut rx) = rtrb::RingBuffer::new(1);
        let mut engine = LoopEngine::new(options(16), tx);
        let atomics = engine.atomics();

        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(atomics.dropped_events(), 0);
        engine.process(&[0.5; 3], &mut [0.0; 3]);
        engine.handle_command(EngineCommand::Footswitch);
        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(atomics.dropped_events(), 2);

        assert_eq!(states(&mut rx), vec![EngineState::InitRecording]);
        assert_eq!(atomics.state(), EngineState::Overdubbing);
    }

    /// xorshift64, so generated command sequences replay exactly
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }

        fn below(&mut self, n: u64) -> u64 {
            self.next() % n
        }
    }

    #[test]
    fn test_generated_sequences_follow_the_transition_table() {
        const CAPACITY: usize = 40;

        for seed in 1..=64u64 {
            let mut rng = XorShift(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let (mut engine, mut rx) = new_engine(CAPACITY);
            let atomics = engine.atomics();
            let mut frozen: Option<usize> = None;

            for step in 0..400 {
                let before = engine.state();
                let length_before = engine.loop_length();
                let layers_before = engine.layer_count();

                let expected = match rng.below(10) {
                    0..=3 => {
                        engine.handle_command(EngineCommand::Footswitch);
                        match before {
                            EngineState::Empty => EngineState::InitRecording,
                            EngineState::InitRecording if length_before > 0 => {
                                EngineState::Playing
                            }
                            EngineState::InitRecording => EngineState::InitRecording,
                            EngineState::Playing => EngineState::Overdubbing,
                            EngineState::Overdubbing => EngineState::Playing,
                        }
                    }
                    4 | 5 => {
                        engine.handle_command(EngineCommand::Undo);
                        if before.is_looping() && layers_before > 0 {
                            EngineState::Playing
                        } else {
                            before
                        }
                    }
                    6 if rng.below(4) == 0 => {
                        engine.handle_command(EngineCommand::Reset);
                        EngineState::Empty
                    }
                    6 => {
                        engine.handle_command(EngineCommand::SetLatency {
                            input_samples: rng.below(50) as u32,
                            output_samples: rng.below(50) as u32,
                        });
                        before
                    }
                    _ => {
                        let frames = 1 + rng.below(24) as usize;
                        let input: Vec<Sample> =
                            (0..frames).map(|i| (i % 3) as f32 * 0.1).collect();
                        engine.process(&input, &mut vec![0.0; frames]);
                        if before == EngineState::InitRecording
                            && length_before + frames >= CAPACITY
                        {
                            EngineState::Playing
                        } else {
                            before
                        }
                    }
                };

                let state = engine.state();
                assert_eq!(state, expected, "seed {} step {}", seed, step);

                let emitted = states(&mut rx);
                if state == before {
                    assert!(emitted.is_empty(), "seed {} step {}", seed, step);
                } else {
                    assert_eq!(emitted, vec![state], "seed {} step {}", seed, step);
                }
                assert_eq!(atomics.state(), state);
                assert_eq!(atomics.layer_count(), engine.layer_count());
                assert!(engine.layer_count() <= 8);

                let length = engine.loop_length();
                match state {
                    EngineState::Empty => {
                        assert_eq!(length, 0);
                        frozen = None;
                    }
                    EngineState::InitRecording => {
                        assert!(length < CAPACITY);
                        assert_eq!(frozen, None);
                    }
                    EngineState::Playing | EngineState::Overdubbing => {
                        assert!(length > 0);
                        assert_eq!(*frozen.get_or_insert(length), length);
                        assert!(
                            engine.playhead() < length,
                            "seed {} step {}: playhead {} of {}",
                            seed,
                            step,
                            engine.playhead(),
                            length
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_options_from_seconds() {
        let options = EngineOptions::from_seconds(48_000, 300.0, 0.05, 0.0, 0);
        assert_eq!(options.buffer_capacity_samples, 14_400_000);
        assert_eq!(options.update_progress_interval_samples, 2_400);
        assert_eq!(options.overdub_arena_samples, 14_400_000);
        assert_eq!(options.max_overdub_layers, 1);

        let tiny = EngineOptions::from_seconds(48_000, 0.0, 0.0, 0.0, 4);
        assert_eq!(tiny.buffer_capacity_samples, 1);
        assert_eq!(tiny.update_progress_interval_samples, 1);
    }
}
