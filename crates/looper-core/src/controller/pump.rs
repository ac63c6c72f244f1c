//! Engine event pump
//!
//! Drains [`EngineEvent`]s from the render context and folds them into the
//! published [`LooperStatus`]. Events are authoritative. The engine counts
//! events it had to drop on a full queue; when that count moves, the state
//! is re-read from [`LoopAtomics`]. The layer count has no event and is
//! always taken from the atomics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use super::latency::LatencyEstimate;
use super::status::LooperStatus;
use crate::audio::{LatencyMeter, StreamFormat};
use crate::engine::{EngineEvent, EngineState, LoopAtomics};

/// Period at which the pump task drains the event queue
pub(crate) const PUMP_PERIOD: Duration = Duration::from_millis(10);

/// Periodic latency refresh for observers
pub(crate) struct LatencyPoll {
    pub meter: Arc<LatencyMeter>,
    pub format: StreamFormat,
    pub every: Duration,
    pub last: Instant,
}

pub(crate) struct EventPump {
    events: rtrb::Consumer<EngineEvent>,
    atomics: Arc<LoopAtomics>,
    status: Arc<watch::Sender<LooperStatus>>,
    latency_poll: Option<LatencyPoll>,
    /// Dropped-event count already accounted for
    seen_drops: u64,
}

impl EventPump {
    pub fn new(
        events: rtrb::Consumer<EngineEvent>,
        atomics: Arc<LoopAtomics>,
        status: Arc<watch::Sender<LooperStatus>>,
    ) -> Self {
        Self {
            events,
            atomics,
            status,
            latency_poll: None,
            seen_drops: 0,
        }
    }

    pub fn with_latency_poll(mut self, poll: Option<LatencyPoll>) -> Self {
        self.latency_poll = poll;
        self
    }

    /// Apply every pending event, then reconcile; returns the event count
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.pop() {
            count += 1;
            self.apply(event);
        }
        let drops = self.atomics.dropped_events();
        let lost_events = drops != self.seen_drops;
        if lost_events {
            log::debug!(
                "Engine dropped {} event(s), re-reading state",
                drops.wrapping_sub(self.seen_drops)
            );
            self.seen_drops = drops;
        }
        self.reconcile(lost_events);
        count
    }

    fn apply(&self, event: EngineEvent) {
        match event {
            EngineEvent::SetState(state) => {
                self.status.send_if_modified(|status| {
                    if status.state == state {
                        return false;
                    }
                    log::info!("Looper state: {} -> {}", status.state, state);
                    status.state = state;
                    if state == EngineState::Empty {
                        status.progress = 0.0;
                    }
                    true
                });
            }
            EngineEvent::SetProgress(progress) => {
                self.status.send_if_modified(|status| {
                    if status.progress == progress {
                        return false;
                    }
                    status.progress = progress;
                    true
                });
            }
        }
    }

    /// Sync the layer count, and the state too if events were lost
    fn reconcile(&self, lost_events: bool) {
        let state = lost_events.then(|| self.atomics.state());
        let layers = self.atomics.layer_count();
        self.status.send_if_modified(|status| {
            let mut changed = false;
            if let Some(state) = state.filter(|s| *s != status.state) {
                log::debug!("Reconciled looper state {} -> {}", status.state, state);
                status.state = state;
                if state == EngineState::Empty {
                    status.progress = 0.0;
                }
                changed = true;
            }
            if status.layers != layers {
                status.layers = layers;
                changed = true;
            }
            changed
        });
    }

    fn poll_latency(&mut self) {
        let Some(poll) = self.latency_poll.as_mut() else {
            return;
        };
        if poll.last.elapsed() < poll.every {
            return;
        }
        poll.last = Instant::now();

        let compensation = self.status.borrow().latency.compensation_secs;
        let estimate = LatencyEstimate::measure(&poll.meter, &poll.format, compensation);
        self.status.send_if_modified(|status| {
            if status.latency == estimate {
                return false;
            }
            status.latency = estimate;
            true
        });
    }

    /// Drain on a fixed period until the render graph is gone
    pub async fn run(mut self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.drain();
            self.poll_latency();
            if self.events.is_abandoned() {
                self.drain();
                log::debug!("Event pump stopped: render graph dropped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{command_channel, event_channel, EngineCommand, EngineOptions, LoopEngine};

    fn status_channel() -> (Arc<watch::Sender<LooperStatus>>, watch::Receiver<LooperStatus>) {
        let (tx, rx) = watch::channel(LooperStatus::default());
        (Arc::new(tx), rx)
    }

    #[test]
    fn test_events_update_status() {
        let (mut events, events_rx) = event_channel();
        let (status, rx) = status_channel();
        let atomics = Arc::new(LoopAtomics::new());
        let mut pump = EventPump::new(events_rx, atomics, status);

        events
            .push(EngineEvent::SetState(EngineState::InitRecording))
            .unwrap();
        events.push(EngineEvent::SetProgress(0.25)).unwrap();
        assert_eq!(pump.drain(), 2);

        // Nothing was dropped, so the events stand even though the atomics lag
        assert_eq!(rx.borrow().state, EngineState::InitRecording);
        assert_eq!(rx.borrow().progress, 0.25);

        pump.drain();
        assert_eq!(rx.borrow().state, EngineState::InitRecording);
        assert_eq!(rx.borrow().progress, 0.25);
    }

    #[test]
    fn test_drain_between_commands_and_block_keeps_new_state() {
        let (events, events_rx) = event_channel();
        let mut engine = LoopEngine::new(
            EngineOptions {
                buffer_capacity_samples: 64,
                update_progress_interval_samples: 1024,
                overdub_arena_samples: 64,
                max_overdub_layers: 2,
            },
            events,
        );
        let (mut commands, mut commands_rx) = command_channel();
        let (status, rx) = status_channel();
        let mut pump = EventPump::new(events_rx, engine.atomics(), status);
        let mut seen = Vec::new();

        // The audio thread has taken the command but not finished the block
        commands.push(EngineCommand::Footswitch).unwrap();
        engine.process_commands(&mut commands_rx);
        pump.drain();
        seen.push(rx.borrow().state);

        engine.process(&[0.5; 8], &mut [0.0; 8]);
        pump.drain();
        seen.push(rx.borrow().state);

        commands.push(EngineCommand::Footswitch).unwrap();
        commands.push(EngineCommand::Footswitch).unwrap();
        engine.process_commands(&mut commands_rx);
        pump.drain();
        seen.push(rx.borrow().state);
        assert_eq!(rx.borrow().layers, 1);

        assert_eq!(
            seen,
            vec![
                EngineState::InitRecording,
                EngineState::InitRecording,
                EngineState::Overdubbing,
            ]
        );
    }

    #[test]
    fn test_pump_follows_a_real_engine() {
        let (events, events_rx) = event_channel();
        let mut engine = LoopEngine::new(
            EngineOptions {
                buffer_capacity_samples: 64,
                update_progress_interval_samples: 4,
                overdub_arena_samples: 64,
                max_overdub_layers: 2,
            },
            events,
        );
        let (status, rx) = status_channel();
        let mut pump = EventPump::new(events_rx, engine.atomics(), status);

        let input = [0.5_f32; 8];
        let mut output = [0.0_f32; 8];
        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&input, &mut output);
        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&input, &mut output);
        pump.drain();

        let status = rx.borrow().clone();
        assert_eq!(status.state, EngineState::Playing);
        assert!(status.progress >= 0.0 && status.progress < 1.0);
        assert_eq!(status.layers, 0);
    }

    #[test]
    fn test_reconcile_recovers_dropped_state() {
        // Room for a single event: the second transition is dropped
        let (events, events_rx) = rtrb::RingBuffer::new(1);
        let mut engine = LoopEngine::new(
            EngineOptions {
                buffer_capacity_samples: 16,
                update_progress_interval_samples: 1024,
                overdub_arena_samples: 16,
                max_overdub_layers: 1,
            },
            events,
        );
        let (status, rx) = status_channel();
        let mut pump = EventPump::new(events_rx, engine.atomics(), status);

        engine.handle_command(EngineCommand::Footswitch);
        engine.process(&[0.0; 4], &mut [0.0; 4]);
        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(engine.atomics().dropped_events(), 1);

        assert_eq!(pump.drain(), 1);
        assert_eq!(rx.borrow().state, EngineState::Playing);

        // Counted once; a later drain leaves a newer event alone
        engine.handle_command(EngineCommand::Footswitch);
        assert_eq!(pump.drain(), 1);
        assert_eq!(rx.borrow().state, EngineState::Overdubbing);
        assert_eq!(rx.borrow().layers, 1);
    }

    #[test]
    fn test_reset_clears_progress() {
        let (mut events, events_rx) = event_channel();
        let (status, rx) = status_channel();
        status.send_modify(|s| {
            s.state = EngineState::Playing;
            s.progress = 0.5;
        });
        let mut pump = EventPump::new(events_rx, Arc::new(LoopAtomics::new()), status);

        events.push(EngineEvent::SetState(EngineState::Empty)).unwrap();
        pump.drain();
        assert_eq!(rx.borrow().state, EngineState::Empty);
        assert_eq!(rx.borrow().progress, 0.0);
    }

    #[test]
    fn test_latency_poll_refreshes_estimate() {
        let (_events, events_rx) = event_channel();
        let (status, rx) = status_channel();
        let meter = Arc::new(LatencyMeter::new());
        meter.record_input(Duration::from_millis(2));
        let format = StreamFormat {
            sample_rate: 1_000,
            buffer_size: 0,
            input_channels: 1,
            output_channels: 1,
        };
        let mut pump = EventPump::new(events_rx, Arc::new(LoopAtomics::new()), status)
            .with_latency_poll(Some(LatencyPoll {
                meter,
                format,
                every: Duration::ZERO,
                last: Instant::now(),
            }));

        pump.poll_latency();
        assert!((rx.borrow().latency.input_secs - 0.002).abs() < 1e-9);
    }
}
