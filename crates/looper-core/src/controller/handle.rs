//! Engine controller: builds the graph and relays performer actions

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::cancel::CancelToken;
use super::latency::LatencyEstimate;
use super::pump::{EventPump, LatencyPoll, PUMP_PERIOD};
use super::status::{ContextState, LooperStatus, StatusError};
use crate::audio::{
    capture_channel, AudioError, AudioHost, AudioResult, AudioStream, CommandSender,
    LatencyMeter, RenderGraph, StreamFormat,
};
use crate::config::{LooperConfig, MAX_LATENCY_COMPENSATION_SECONDS};
use crate::engine::{command_channel, event_channel, EngineCommand, GainParam, GainStage, LoopEngine};

/// The two device streams of a running graph
///
/// Released at most once: by [`StreamSet::release`] or on drop, whichever
/// comes first. During setup it owns whatever has been opened so far, so an
/// early return (error, cancellation or a dropped setup future) releases
/// exactly the streams that exist.
#[derive(Default)]
struct StreamSet {
    capture: Option<Box<dyn AudioStream>>,
    output: Option<Box<dyn AudioStream>>,
}

impl StreamSet {
    fn is_open(&self) -> bool {
        self.capture.is_some() && self.output.is_some()
    }

    /// Output first, so the capture queue always has a reader
    ///
    /// If capture refuses to start, output is paused again: the pair is
    /// either running or stopped, never half of each.
    fn play(&mut self) -> AudioResult<()> {
        let (Some(capture), Some(output)) = (self.capture.as_mut(), self.output.as_mut()) else {
            return Err(AudioError::EngineUnavailable);
        };
        output.play()?;
        if let Err(err) = capture.play() {
            if let Err(rollback) = output.pause() {
                log::warn!("Output left running after capture failed to start: {}", rollback);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Capture first; restarted if output refuses to pause
    fn pause(&mut self) -> AudioResult<()> {
        let (Some(capture), Some(output)) = (self.capture.as_mut(), self.output.as_mut()) else {
            return Err(AudioError::EngineUnavailable);
        };
        capture.pause()?;
        if let Err(err) = output.pause() {
            if let Err(rollback) = capture.play() {
                log::warn!("Capture left paused after output failed to pause: {}", rollback);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Close both streams; returns false if nothing was open
    fn release(&mut self) -> bool {
        let output = self.output.take();
        let capture = self.capture.take();
        let released = output.is_some() || capture.is_some();
        drop(output);
        drop(capture);
        released
    }
}

impl Drop for StreamSet {
    fn drop(&mut self) {
        if self.release() {
            log::debug!("Audio streams released");
        }
    }
}

/// Control-plane owner of the looper graph
///
/// Created by [`EngineController::start`], or [`EngineController::disconnected`]
/// when no graph could be built. Every performer action goes through the
/// engine's command queue; state comes back through [`Self::subscribe`].
pub struct EngineController {
    streams: StreamSet,
    commands: Option<CommandSender>,
    format: Option<StreamFormat>,
    meter: Arc<LatencyMeter>,
    gain: Arc<GainParam>,
    status: Arc<watch::Sender<LooperStatus>>,
    pump: Option<JoinHandle<()>>,
}

impl EngineController {
    /// Acquire the streams and wire the graph
    ///
    /// Steps: negotiate, open capture, allocate the engine, open output,
    /// start both streams. `cancel` is checked before each step commits;
    /// on cancellation or failure everything opened so far is released
    /// once and the error is returned. Must run inside a tokio runtime.
    pub async fn start<H: AudioHost>(
        host: H,
        config: LooperConfig,
        cancel: CancelToken,
    ) -> AudioResult<Self> {
        match Self::setup(host, config.validated(), &cancel).await {
            Ok(controller) => Ok(controller),
            Err(err) if err.is_cancellation() => {
                log::info!("Looper setup cancelled");
                Err(err)
            }
            Err(err) => {
                log::error!("Looper setup failed ({}): {}", err.category(), err);
                Err(err)
            }
        }
    }

    async fn setup<H: AudioHost>(
        mut host: H,
        config: LooperConfig,
        cancel: &CancelToken,
    ) -> AudioResult<Self> {
        cancel.check()?;
        let format = host.negotiate(&config.audio, &config.capture)?;
        log::info!(
            "Negotiated {} Hz, {} frames, {} in / {} out channels",
            format.sample_rate,
            format.buffer_size,
            format.input_channels,
            format.output_channels
        );
        cancel.check()?;

        let mut streams = StreamSet::default();
        let meter = Arc::new(LatencyMeter::new());

        // 1. Capture
        let (feed, capture_rx) = capture_channel(Arc::clone(&meter));
        streams.capture = Some(host.open_capture(&format, feed)?);
        log::debug!("Capture stream opened");
        tokio::task::yield_now().await;
        cancel.check()?;

        // 2. Engine, allocated off the async thread
        let options = config.engine_options(format.sample_rate);
        let (events_tx, events_rx) = event_channel();
        let engine = tokio::task::spawn_blocking(move || LoopEngine::new(options, events_tx))
            .await
            .map_err(|e| AudioError::StreamBuildError(format!("loop engine allocation failed: {}", e)))?;
        cancel.check()?;

        // 3. Output
        let atomics = engine.atomics();
        let (commands_tx, commands_rx) = command_channel();
        let gain = Arc::new(GainParam::new(config.initial_gain));
        let stage = GainStage::new(Arc::clone(&gain), config.gain_ramp_samples(format.sample_rate));
        let graph = RenderGraph::new(engine, commands_rx, capture_rx, stage);
        streams.output = Some(host.open_output(&format, graph, Arc::clone(&meter))?);
        log::debug!("Output stream opened");
        cancel.check()?;

        // 4. Start
        streams.play()?;

        let latency = LatencyEstimate::measure(&meter, &format, config.latency_compensation_seconds);
        let (status_tx, _) = watch::channel(LooperStatus {
            latency,
            gain: gain.get(),
            context: ContextState::Running,
            ..Default::default()
        });
        let status = Arc::new(status_tx);

        let poll = config.latency_poll_interval().map(|every| LatencyPoll {
            meter: Arc::clone(&meter),
            format,
            every,
            last: Instant::now(),
        });
        let pump = EventPump::new(events_rx, atomics, Arc::clone(&status)).with_latency_poll(poll);
        let pump = tokio::spawn(pump.run(PUMP_PERIOD));

        log::info!(
            "Looper running, latency estimate {:.1} ms",
            latency.total_secs() * 1000.0
        );

        Ok(Self {
            streams,
            commands: Some(CommandSender::new(commands_tx)),
            format: Some(format),
            meter,
            gain,
            status,
            pump: Some(pump),
        })
    }

    /// Controller without a graph, e.g. after setup failed
    ///
    /// Every engine action returns [`AudioError::EngineUnavailable`].
    pub fn disconnected(config: &LooperConfig, error: Option<&AudioError>) -> Self {
        let gain = Arc::new(GainParam::new(config.initial_gain));
        let (status_tx, _) = watch::channel(LooperStatus {
            latency: LatencyEstimate {
                compensation_secs: config.latency_compensation_seconds,
                ..Default::default()
            },
            gain: gain.get(),
            context: ContextState::Closed,
            error: error
                .filter(|e| !e.is_cancellation())
                .map(StatusError::from),
            ..Default::default()
        });
        Self {
            streams: StreamSet::default(),
            commands: None,
            format: None,
            meter: Arc::new(LatencyMeter::new()),
            gain,
            status: Arc::new(status_tx),
            pump: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Performer actions
    // ═══════════════════════════════════════════════════════════════════════

    /// Advance the loop state machine
    ///
    /// Pushes the current latency estimate first, so the engine reads with
    /// an up-to-date offset from this block on.
    pub fn footswitch(&mut self) -> AudioResult<()> {
        let result = self.push_latency();
        let result = result.and_then(|()| self.send(EngineCommand::Footswitch));
        self.settle(result)
    }

    /// Remove the newest overdub layer
    pub fn undo(&mut self) -> AudioResult<()> {
        let result = self.send(EngineCommand::Undo);
        self.settle(result)
    }

    /// Forget the loop and every layer
    pub fn reset(&mut self) -> AudioResult<()> {
        let result = self.send(EngineCommand::Reset);
        self.settle(result)
    }

    /// Ramp the output gain to `value` (negative values become 0.0)
    pub fn set_gain(&self, value: f32) {
        self.gain.set(value);
        let gain = self.gain.get();
        log::debug!("Gain target {:.3}", gain);
        self.status.send_if_modified(|status| {
            if status.gain == gain {
                return false;
            }
            status.gain = gain;
            true
        });
    }

    /// Change the manual latency correction; returns the clamped value
    ///
    /// Takes effect on the next footswitch or resume.
    pub fn set_latency_compensation(&self, secs: f64) -> f64 {
        let secs = if secs.is_finite() {
            secs.clamp(-MAX_LATENCY_COMPENSATION_SECONDS, MAX_LATENCY_COMPENSATION_SECONDS)
        } else {
            0.0
        };
        self.status
            .send_modify(|status| status.latency.compensation_secs = secs);
        secs
    }

    /// Resume both streams and push a fresh latency estimate
    pub fn resume_audio_context(&mut self) -> AudioResult<()> {
        let result = self.streams.play();
        if result.is_ok() {
            log::info!("Audio context resumed");
            self.set_context(ContextState::Running);
        }
        let result = result.and_then(|()| self.push_latency());
        self.settle(result)
    }

    /// Pause both streams; the loop is kept
    pub fn suspend_audio_context(&mut self) -> AudioResult<()> {
        let result = self.streams.pause();
        if result.is_ok() {
            log::info!("Audio context suspended");
            self.set_context(ContextState::Suspended);
        }
        self.settle(result)
    }

    /// Stop the event pump and release both streams
    ///
    /// Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.commands = None;
        if self.streams.release() {
            log::info!("Looper audio closed");
        }
        self.set_context(ContextState::Closed);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Observation
    // ═══════════════════════════════════════════════════════════════════════

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<LooperStatus> {
        self.status.subscribe()
    }

    /// Current status snapshot
    pub fn status(&self) -> LooperStatus {
        self.status.borrow().clone()
    }

    /// Latency estimate from the latest stream measurements
    pub fn latency_estimate(&self) -> LatencyEstimate {
        let compensation = self.status.borrow().latency.compensation_secs;
        match &self.format {
            Some(format) => LatencyEstimate::measure(&self.meter, format, compensation),
            None => LatencyEstimate {
                compensation_secs: compensation,
                ..Default::default()
            },
        }
    }

    /// Whether both streams are open (running or suspended)
    pub fn is_connected(&self) -> bool {
        self.streams.is_open()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.format.map(|f| f.sample_rate)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    fn send(&mut self, cmd: EngineCommand) -> AudioResult<()> {
        let sender = self.commands.as_mut().ok_or(AudioError::EngineUnavailable)?;
        if sender.is_abandoned() {
            log::warn!("Render graph is gone, dropped {:?}", cmd);
            return Err(AudioError::EngineUnavailable);
        }
        sender.send(cmd).map_err(|cmd| {
            log::warn!("Command queue full, dropped {:?}", cmd);
            AudioError::CommandQueueFull
        })
    }

    fn push_latency(&mut self) -> AudioResult<()> {
        let format = self.format.ok_or(AudioError::EngineUnavailable)?;
        let estimate = self.latency_estimate();
        let cmd = estimate.to_command(format.sample_rate);
        self.send(cmd)?;
        log::debug!("Pushed {:?} ({:.2} ms)", cmd, estimate.total_secs() * 1000.0);
        self.status.send_if_modified(|status| {
            if status.latency == estimate {
                return false;
            }
            status.latency = estimate;
            true
        });
        Ok(())
    }

    fn set_context(&self, context: ContextState) {
        self.status.send_if_modified(|status| {
            if status.context == context {
                return false;
            }
            status.context = context;
            true
        });
    }

    /// Publish the outcome of an action
    fn settle(&self, result: AudioResult<()>) -> AudioResult<()> {
        match &result {
            Ok(()) => {
                self.status.send_if_modified(|status| status.error.take().is_some());
            }
            Err(err) => {
                log::warn!("Looper action failed: {}", err);
                let error = StatusError::from(err);
                self.status.send_modify(|status| status.error = Some(error));
            }
        }
        result
    }
}

impl Drop for EngineController {
    fn drop(&mut self) {
        self.close();
    }
}
