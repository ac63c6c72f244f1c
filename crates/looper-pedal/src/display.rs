//! Status formatting for the terminal

use looper_core::controller::{ContextState, LooperStatus};
use looper_core::engine::EngineState;

const BAR_WIDTH: usize = 20;

/// One-line summary of the looper status
pub fn status_line(status: &LooperStatus) -> String {
    let mut line = format!(
        "[{:<12}] {} {:>3}% | layers {} | gain {:.2} | latency {:.1} ms | audio {}",
        status.state.label(),
        progress_bar(status),
        percent(status),
        status.layers,
        status.gain,
        status.latency_secs() * 1000.0,
        status.context,
    );
    if status.latency.input_unavailable {
        line.push_str("\n  ~ input latency is not reported by this device; tune it with 'l <ms>'");
    }
    if let Some(error) = &status.error {
        line.push_str(&format!("\n  ! {} ({})", error.message, error.category));
    }
    line
}

/// Whether the change is worth a new line (progress alone is not)
pub fn headline_changed(previous: &LooperStatus, next: &LooperStatus) -> bool {
    previous.state != next.state
        || previous.layers != next.layers
        || previous.gain != next.gain
        || previous.context != next.context
        || previous.latency.input_unavailable != next.latency.input_unavailable
        || previous.error != next.error
}

fn percent(status: &LooperStatus) -> u32 {
    if status.state.is_looping() {
        (status.progress.clamp(0.0, 1.0) * 100.0) as u32
    } else {
        0
    }
}

fn progress_bar(status: &LooperStatus) -> String {
    let filled = match status.state {
        EngineState::Playing | EngineState::Overdubbing => {
            ((status.progress.clamp(0.0, 1.0) * BAR_WIDTH as f32) as usize).min(BAR_WIDTH)
        }
        EngineState::Empty | EngineState::InitRecording => 0,
    };
    let fill = if status.context == ContextState::Running {
        '#'
    } else {
        '='
    };
    let mut bar = String::with_capacity(BAR_WIDTH);
    bar.extend(std::iter::repeat(fill).take(filled));
    bar.extend(std::iter::repeat('.').take(BAR_WIDTH - filled));
    bar
}
