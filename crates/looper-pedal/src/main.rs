//! Looper Pedal - single-track looper driven from the terminal
//!
//! This is the main entry point. It:
//! 1. Loads `config.yaml` (or the file given with `--config <path>`)
//! 2. Builds the audio graph through the engine controller
//! 3. Maps terminal lines to pedal actions and prints status changes
//!
//! ## Command line flags
//!
//! - `--config <path>`: Use a config file other than the default one
//! - `--list-devices`: Print audio devices and exit

mod display;
mod input;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncBufReadExt;

use input::PedalAction;
use looper_core::audio::{list_devices, CpalHost, Direction};
use looper_core::config::{default_config_path, load_config, save_config, LooperConfig};
use looper_core::controller::{CancelToken, EngineController};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if args.iter().any(|arg| arg == "--list-devices") {
        print_devices();
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                        Looper Pedal                          ║");
    println!("║              record · loop · overdub · undo                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let config: LooperConfig = load_config(&config_path);
    let config = config.validated();

    // Device streams are not Send, so the controller stays on this thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let settings = Settings {
        config,
        path: config_path,
    };
    let result = runtime.block_on(run(settings));

    // Stdin is read on a blocking thread that may still be waiting for a line
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

/// Config in effect, and where changes made at the prompt are saved
struct Settings {
    config: LooperConfig,
    path: PathBuf,
}

impl Settings {
    /// Keep a compensation set at the prompt for the next session
    fn save_compensation(&mut self, secs: f64) {
        self.config.latency_compensation_seconds = secs;
        if let Err(e) = save_config(&self.config, &self.path) {
            log::warn!("Latency compensation not saved: {:#}", e);
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

async fn run(mut settings: Settings) -> Result<()> {
    let config = settings.config.clone();
    let cancel = CancelToken::new();
    let setup = EngineController::start(CpalHost::new(), config.clone(), cancel.clone());

    let mut controller = tokio::select! {
        result = setup => match result {
            Ok(controller) => controller,
            Err(e) => {
                eprintln!("Warning: {}", e.user_message());
                EngineController::disconnected(&config, Some(&e))
            }
        },
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            log::info!("Interrupted during audio setup");
            return Ok(());
        }
    };

    println!("{}", input::HELP);
    println!();
    if !controller.is_connected() {
        println!("Running without audio; only 'status', 'devices', 'l' and 'quit' are useful");
    }

    let mut status_rx = controller.subscribe();
    let mut shown = status_rx.borrow_and_update().clone();
    println!("{}", display::status_line(&shown));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    log::info!("Stdin closed");
                    break;
                };
                match line.parse::<PedalAction>() {
                    Ok(PedalAction::Quit) => break,
                    Ok(action) => apply(&mut controller, &mut settings, action),
                    Err(e) => println!("{:#}", e),
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if display::headline_changed(&shown, &status) {
                    println!("{}", display::status_line(&status));
                }
                shown = status;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    controller.close();
    println!("Bye.");
    Ok(())
}

fn apply(controller: &mut EngineController, settings: &mut Settings, action: PedalAction) {
    let result = match action {
        PedalAction::Footswitch => controller.footswitch(),
        PedalAction::Undo => controller.undo(),
        PedalAction::Reset => controller.reset(),
        PedalAction::Gain(value) => {
            controller.set_gain(value);
            Ok(())
        }
        PedalAction::Compensation(ms) => {
            let applied = controller.set_latency_compensation(ms / 1000.0);
            settings.save_compensation(applied);
            println!(
                "Latency compensation {:+.1} ms (applied on next footswitch, saved to {})",
                applied * 1000.0,
                settings.path().display()
            );
            Ok(())
        }
        PedalAction::Suspend => controller.suspend_audio_context(),
        PedalAction::Resume => controller.resume_audio_context(),
        PedalAction::Status => {
            println!("{}", display::status_line(&controller.status()));
            Ok(())
        }
        PedalAction::Devices => {
            print_devices();
            Ok(())
        }
        PedalAction::Help => {
            println!("{}", input::HELP);
            Ok(())
        }
        PedalAction::Quit => Ok(()),
    };
    if let Err(e) = result {
        println!("{}", e.user_message());
    }
}

fn print_devices() {
    for (title, direction) in [("Inputs", Direction::Input), ("Outputs", Direction::Output)] {
        println!("{}:", title);
        let devices = list_devices(direction);
        if devices.is_empty() {
            println!("  (none)");
        }
        for device in devices {
            let marker = if device.is_default { "*" } else { " " };
            println!(
                "  {} {} ({} ch, {:?} Hz)",
                marker, device, device.max_channels, device.sample_rates
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compensation_is_saved_for_next_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("looper").join("config.yaml");
        let mut settings = Settings {
            config: LooperConfig {
                max_recording_seconds: 30.0,
                ..Default::default()
            },
            path: path.clone(),
        };

        settings.save_compensation(-0.0125);
        let loaded: LooperConfig = load_config(&path);
        assert_eq!(loaded.latency_compensation_seconds, -0.0125);
        assert_eq!(loaded.max_recording_seconds, 30.0);

        settings.save_compensation(0.0);
        let loaded: LooperConfig = load_config(&path);
        assert_eq!(loaded.latency_compensation_seconds, 0.0);
    }

    #[test]
    fn test_compensation_applies_while_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = LooperConfig::default();
        let mut controller = EngineController::disconnected(&config, None);
        let mut settings = Settings { config, path: path.clone() };

        apply(&mut controller, &mut settings, PedalAction::Compensation(20.0));
        assert_eq!(controller.status().latency.compensation_secs, 0.02);
        let loaded: LooperConfig = load_config(&path);
        assert_eq!(loaded.latency_compensation_seconds, 0.02);
    }
}
