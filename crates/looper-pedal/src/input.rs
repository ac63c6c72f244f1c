//! Terminal commands
//!
//! One command per line. An empty line is the footswitch, so Enter works
//! like stepping on the pedal.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context};

/// A parsed terminal command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PedalAction {
    Footswitch,
    Undo,
    Reset,
    /// Target gain (1.0 = unity)
    Gain(f32),
    /// Manual latency correction in milliseconds
    Compensation(f64),
    Suspend,
    Resume,
    Status,
    Devices,
    Help,
    Quit,
}

impl FromStr for PedalAction {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(PedalAction::Footswitch);
        };
        let argument = words.next();
        if words.next().is_some() {
            bail!("Too many arguments: '{}'", line.trim());
        }

        let action = match word.to_ascii_lowercase().as_str() {
            "f" | "footswitch" => PedalAction::Footswitch,
            "u" | "undo" => PedalAction::Undo,
            "r" | "reset" => PedalAction::Reset,
            "g" | "gain" => {
                let value = argument.ok_or_else(|| anyhow!("Usage: gain <value>"))?;
                let value: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid gain '{}'", value))?;
                if !value.is_finite() || value < 0.0 {
                    bail!("Gain must be a non-negative number");
                }
                return Ok(PedalAction::Gain(value));
            }
            "l" | "latency" => {
                let value = argument.ok_or_else(|| anyhow!("Usage: latency <ms>"))?;
                let ms: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid latency '{}'", value))?;
                return Ok(PedalAction::Compensation(ms));
            }
            "s" | "suspend" => PedalAction::Suspend,
            "p" | "resume" => PedalAction::Resume,
            "status" => PedalAction::Status,
            "d" | "devices" => PedalAction::Devices,
            "h" | "help" | "?" => PedalAction::Help,
            "q" | "quit" | "exit" => PedalAction::Quit,
            other => bail!("Unknown command '{}' (type 'help')", other),
        };

        if argument.is_some() {
            bail!("'{}' takes no argument", word);
        }
        Ok(action)
    }
}

pub const HELP: &str = "\
  <enter> | f      footswitch (record / play / overdub)
  u                undo last overdub layer
  r                reset the loop
  g <value>        set gain (1.0 = unity)
  l <ms>           latency compensation in milliseconds (saved)
  s | p            suspend / resume audio
  status           print the current status
  d                list audio devices
  q                quit";
