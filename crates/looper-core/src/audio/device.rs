//! Audio device enumeration and lookup
//!
//! Devices are enumerated from every available cpal host (JACK, ALSA,
//! PulseAudio, CoreAudio, WASAPI...). A configured [`DeviceId`] selects a
//! device by name, optionally restricted to one host.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Which side of the graph a device serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its display name
fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn devices_of(host: &Host, direction: Direction) -> AudioResult<Vec<cpal::Device>> {
    let devices: Result<Vec<cpal::Device>, cpal::DevicesError> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    };
    devices.map_err(|e| AudioError::ConfigError(e.to_string()))
}

fn default_of(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

fn not_found(direction: Direction, name: &str) -> AudioError {
    match direction {
        Direction::Input => AudioError::CaptureDeviceNotFound(name.to_string()),
        Direction::Output => AudioError::DeviceNotFound(name.to_string()),
    }
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    /// Maximum channels in this direction
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// List devices for one direction across all hosts
///
/// Default devices come first, then by host and name. Hosts that fail to
/// initialise are skipped.
pub fn list_devices(direction: Direction) -> Vec<AudioDevice> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = default_of(&host, direction).and_then(|d| d.name().ok());

        let devices = match devices_of(&host, direction) {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices {
            let Ok(name) = device.name() else { continue };
            let ranges: Vec<(u32, u32, u16)> = match direction {
                Direction::Input => device.supported_input_configs().map(|c| {
                    c.map(|r| (r.min_sample_rate().0, r.max_sample_rate().0, r.channels()))
                        .collect()
                }),
                Direction::Output => device.supported_output_configs().map(|c| {
                    c.map(|r| (r.min_sample_rate().0, r.max_sample_rate().0, r.channels()))
                        .collect()
                }),
            }
            .unwrap_or_default();

            if ranges.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;
            for (min, max, channels) in &ranges {
                max_channels = max_channels.max(*channels);
                for rate in [44100, 48000, 88200, 96000] {
                    if rate >= *min && rate <= *max && !sample_rates.contains(&rate) {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort_unstable();

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                sample_rates,
                max_channels,
            });
        }
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::debug!("Enumerated {} {:?} devices", all_devices.len(), direction);
    all_devices
}

/// Find a device by its ID
///
/// Uses the host named in the ID if there is one, otherwise searches every
/// host for a device with that name.
pub fn find_device_by_id(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return devices_of(&host, direction)?
            .into_iter()
            .find(|d| d.name().ok().as_ref() == Some(&id.name))
            .ok_or_else(|| not_found(direction, &id.name));
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        let Ok(devices) = devices_of(&host, direction) else {
            continue;
        };
        if let Some(device) = devices
            .into_iter()
            .find(|d| d.name().ok().as_ref() == Some(&id.name))
        {
            return Ok(device);
        }
    }

    Err(not_found(direction, &id.name))
}

/// Default device of the default host
pub fn default_device(direction: Direction) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    default_of(&host, direction).ok_or_else(|| match direction {
        Direction::Input => AudioError::CaptureDeviceNotFound("no default input device".to_string()),
        Direction::Output => AudioError::NoOutputDevice,
    })
}

/// Resolve an optional configured device, falling back to the default
pub fn resolve_device(id: Option<&DeviceId>, direction: Direction) -> AudioResult<cpal::Device> {
    match id {
        Some(id) => {
            log::debug!("Looking up configured {:?} device {}", direction, id.display_label());
            find_device_by_id(id, direction)
        }
        None => default_device(direction),
    }
}
