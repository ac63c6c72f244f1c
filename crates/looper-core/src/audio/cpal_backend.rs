//! CPAL audio host
//!
//! Opens one capture stream and one output stream, possibly on different
//! devices (and different cpal hosts), at a shared sample rate.
//!
//! ```text
//!  Capture device                                          Output device
//! ┌────────────────┐   CaptureFeed    ┌──────────────┐    ┌────────────────┐
//! │ input callback │──(rtrb ring)────►│ RenderGraph  │───►│ device frames  │
//! │ downmix → mono │                  │ (owned by the│    │ mono → all ch. │
//! └────────────────┘                  │ out callback)│    └────────────────┘
//!                                     └──────────────┘
//! ```
//!
//! Both streams are built paused. The controller starts them once the whole
//! graph exists.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, FromSample, Sample, SampleFormat, SizedSample, Stream,
    StreamConfig, SupportedBufferSize, SupportedStreamConfig,
};

use super::backend::{AudioHost, AudioStream, StreamFormat};
use super::config::{
    AudioConfig, BufferSize, CaptureConstraints, DEFAULT_SAMPLE_RATE, LOW_LATENCY_BUFFER_SIZE,
};
use super::device::{resolve_device, Direction};
use super::error::{AudioError, AudioResult};
use super::graph::{CaptureFeed, LatencyMeter, RenderGraph};

/// Which half of the graph a stream belongs to (decides error categories)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamRole {
    Capture,
    Output,
}

/// A cpal stream; dropping it closes the device
pub struct CpalStream {
    stream: Stream,
    role: StreamRole,
}

impl CpalStream {
    fn control_error(&self, message: String) -> AudioError {
        match self.role {
            StreamRole::Capture => AudioError::from_capture_message(message),
            StreamRole::Output => AudioError::StreamPlayError(message),
        }
    }
}

impl AudioStream for CpalStream {
    fn play(&mut self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| self.control_error(e.to_string()))
    }

    fn pause(&mut self) -> AudioResult<()> {
        self.stream
            .pause()
            .map_err(|e| self.control_error(e.to_string()))
    }
}

/// Devices and configs chosen by [`AudioHost::negotiate`]
struct Negotiated {
    input: cpal::Device,
    input_config: SupportedStreamConfig,
    output: cpal::Device,
    output_config: SupportedStreamConfig,
    buffer_size: Option<u32>,
}

/// [`AudioHost`] backed by cpal
#[derive(Default)]
pub struct CpalHost {
    negotiated: Option<Negotiated>,
}

impl CpalHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn negotiated(&self) -> AudioResult<&Negotiated> {
        self.negotiated
            .as_ref()
            .ok_or_else(|| AudioError::ConfigError("streams opened before negotiation".to_string()))
    }
}

impl AudioHost for CpalHost {
    fn negotiate(
        &mut self,
        config: &AudioConfig,
        constraints: &CaptureConstraints,
    ) -> AudioResult<StreamFormat> {
        let output = resolve_device(config.output_device.as_ref(), Direction::Output)?;
        let input = resolve_device(config.input_device.as_ref(), Direction::Input)?;

        log::info!(
            "Output device: {}",
            output.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        log::info!(
            "Input device: {}",
            input.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let output_config = get_output_config(&output, config)?;
        let sample_rate = output_config.sample_rate().0;
        let input_config = get_input_config(&input, sample_rate, constraints.channel_count)?;

        let requested = match config.buffer_size {
            BufferSize::Default if constraints.low_latency => Some(LOW_LATENCY_BUFFER_SIZE),
            other => other.as_frames(),
        };
        let buffer_size = requested.map(|frames| {
            clamp_to_supported(
                clamp_to_supported(frames, output_config.buffer_size()),
                input_config.buffer_size(),
            )
        });

        if constraints.echo_cancellation || constraints.noise_suppression || constraints.auto_gain_control
        {
            log::info!(
                "Capture processing requested (echo cancellation: {}, noise suppression: {}, auto gain: {}); \
                 cpal delivers raw input, so it is left to the system input chain",
                constraints.echo_cancellation,
                constraints.noise_suppression,
                constraints.auto_gain_control
            );
        }

        let format = StreamFormat {
            sample_rate,
            buffer_size: buffer_size.unwrap_or(config.buffer_size.nominal_frames()),
            input_channels: input_config.channels(),
            output_channels: output_config.channels(),
        };

        log::info!(
            "Audio format: {}Hz, {} frames (~{:.1}ms), {} in / {} out channels",
            format.sample_rate,
            format.buffer_size,
            format.base_latency_secs() * 1000.0,
            format.input_channels,
            format.output_channels
        );

        self.negotiated = Some(Negotiated {
            input,
            input_config,
            output,
            output_config,
            buffer_size,
        });
        Ok(format)
    }

    fn open_capture(
        &mut self,
        _format: &StreamFormat,
        feed: CaptureFeed,
    ) -> AudioResult<Box<dyn AudioStream>> {
        let n = self.negotiated()?;
        let stream_config = stream_config(&n.input_config, n.buffer_size);

        let stream = match n.input_config.sample_format() {
            SampleFormat::F32 => build_input_stream::<f32>(&n.input, &stream_config, feed),
            SampleFormat::I16 => build_input_stream::<i16>(&n.input, &stream_config, feed),
            SampleFormat::U16 => build_input_stream::<u16>(&n.input, &stream_config, feed),
            SampleFormat::I32 => build_input_stream::<i32>(&n.input, &stream_config, feed),
            other => Err(AudioError::UnsupportedFormat(format!("capture {:?}", other))),
        }?;
        pause_built(&stream, StreamRole::Capture)?;

        log::debug!("Capture stream built ({} channels)", stream_config.channels);
        Ok(Box::new(CpalStream {
            stream,
            role: StreamRole::Capture,
        }))
    }

    fn open_output(
        &mut self,
        _format: &StreamFormat,
        graph: RenderGraph,
        meter: Arc<LatencyMeter>,
    ) -> AudioResult<Box<dyn AudioStream>> {
        let n = self.negotiated()?;
        let stream_config = stream_config(&n.output_config, n.buffer_size);

        let stream = match n.output_config.sample_format() {
            SampleFormat::F32 => build_output_stream::<f32>(&n.output, &stream_config, graph, meter),
            SampleFormat::I16 => build_output_stream::<i16>(&n.output, &stream_config, graph, meter),
            SampleFormat::U16 => build_output_stream::<u16>(&n.output, &stream_config, graph, meter),
            SampleFormat::I32 => build_output_stream::<i32>(&n.output, &stream_config, graph, meter),
            other => Err(AudioError::UnsupportedFormat(format!("output {:?}", other))),
        }?;
        pause_built(&stream, StreamRole::Output)?;

        log::debug!("Output stream built ({} channels)", stream_config.channels);
        Ok(Box::new(CpalStream {
            stream,
            role: StreamRole::Output,
        }))
    }
}

/// Some backends start streams on build; hold them until the graph is wired
fn pause_built(stream: &Stream, role: StreamRole) -> AudioResult<()> {
    match stream.pause() {
        Ok(()) => Ok(()),
        // Not every backend can pause; it will simply run from here on
        Err(cpal::PauseStreamError::BackendSpecific { err }) => {
            log::debug!("{:?} stream can't be paused before start: {}", role, err);
            Ok(())
        }
        Err(e) => Err(match role {
            StreamRole::Capture => AudioError::from_capture_message(e.to_string()),
            StreamRole::Output => AudioError::StreamPlayError(e.to_string()),
        }),
    }
}

fn stream_config(supported: &SupportedStreamConfig, buffer_size: Option<u32>) -> StreamConfig {
    StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: match buffer_size {
            Some(frames) => CpalBufferSize::Fixed(frames),
            None => CpalBufferSize::Default,
        },
    }
}

fn clamp_to_supported(frames: u32, supported: &SupportedBufferSize) -> u32 {
    match supported {
        SupportedBufferSize::Range { min, max } => frames.clamp(*min, (*max).max(*min)),
        SupportedBufferSize::Unknown => frames,
    }
}

fn rate_in_range(rate: u32, config: &cpal::SupportedStreamConfigRange) -> bool {
    rate >= config.min_sample_rate().0 && rate <= config.max_sample_rate().0
}

/// Map an error from the capture device into a capture category
fn capture_error(err: impl std::fmt::Display, device_gone: bool) -> AudioError {
    if device_gone {
        AudioError::CaptureDeviceNotFound(err.to_string())
    } else {
        AudioError::from_capture_message(err.to_string())
    }
}

/// Get the best output configuration for a device
///
/// Prefers f32 at the requested rate (48kHz by default); the channel count
/// doesn't matter since the mono loop is copied to every channel.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .find(|c| rate_in_range(target_sample_rate, c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| rate_in_range(target_sample_rate, c))
        })
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if rate_in_range(target_sample_rate, best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Output device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok(best_config.clone().with_sample_rate(sample_rate))
}

/// Get an input configuration at exactly `sample_rate`
///
/// Prefers f32 and the requested channel count. There is no resampling in
/// the graph, so a device that can't run at the output rate is an error.
fn get_input_config(
    device: &cpal::Device,
    sample_rate: u32,
    channel_count: u16,
) -> AudioResult<SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| {
            let gone = matches!(e, cpal::SupportedStreamConfigsError::DeviceNotAvailable);
            capture_error(e, gone)
        })?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::CaptureFailed(
            "No supported input configurations".to_string(),
        ));
    }

    let at_rate: Vec<_> = supported_configs
        .iter()
        .filter(|c| rate_in_range(sample_rate, c))
        .collect();

    let best = at_rate
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() == channel_count)
        .or_else(|| at_rate.iter().find(|c| c.channels() == channel_count))
        .or_else(|| at_rate.iter().find(|c| c.sample_format() == SampleFormat::F32))
        .or_else(|| at_rate.first());

    match best {
        Some(config) => Ok((*config).clone().with_sample_rate(cpal::SampleRate(sample_rate))),
        None => {
            let input = device
                .default_input_config()
                .map(|c| c.sample_rate().0)
                .unwrap_or(0);
            Err(AudioError::SampleRateMismatch {
                output: sample_rate,
                input,
            })
        }
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut feed: CaptureFeed,
) -> AudioResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], info: &cpal::InputCallbackInfo| {
                let ts = info.timestamp();
                match ts.callback.duration_since(&ts.capture) {
                    Some(latency) => feed.meter().record_input(latency),
                    None => feed.meter().mark_input_unavailable(),
                }
                feed.push_interleaved(data, channels, |s| f32::from_sample(s));
            },
            move |err| {
                log::error!("Capture stream error: {}", err);
            },
            None,
        )
        .map_err(|e| {
            let gone = matches!(e, cpal::BuildStreamError::DeviceNotAvailable);
            capture_error(e, gone)
        })
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut graph: RenderGraph,
    meter: Arc<LatencyMeter>,
) -> AudioResult<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                let ts = info.timestamp();
                if let Some(latency) = ts.playback.duration_since(&ts.callback) {
                    meter.record_output(latency);
                }
                graph.render_interleaved(data, channels, |s| T::from_sample(s));
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
