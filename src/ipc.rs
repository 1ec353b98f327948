//! Presentation surface: event names and the console renderer.
//! The engine only talks to `Surface`; the renderer decides how a snapshot is shown.

use crate::config::OutputFormat;
use crate::models::SurfaceSnapshot;
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

/// Event names for JSON output (one event per line on stdout)
pub mod events {
    pub const TIMER_TICK: &str = "timer-tick";
    pub const RUNNING_STATE_UPDATE: &str = "running-state-update";
    pub const GOLDEN_STATE_UPDATE: &str = "golden-state-update";
}

/// Text for the golden status element while golden hour is active
pub const GOLDEN_TEXT: &str = "GOLDEN HOUR!";
/// Start control label once a run began
pub const RUNNING_LABEL: &str = "RUNNING";

/// Rendering layer consumed by the engine
pub trait Surface: Send + Sync {
    /// "timer" element
    fn set_timer_text(&self, text: &str);
    /// Start control: disabled and labelled RUNNING once a run is active
    fn set_running(&self, running: bool);
    /// "golden" class on the root plus the golden status text
    fn set_golden(&self, active: bool, text: &str);
}

pub struct ConsoleSurface {
    format: OutputFormat,
    snapshot: Mutex<SurfaceSnapshot>,
}

impl ConsoleSurface {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            snapshot: Mutex::new(SurfaceSnapshot {
                timer_text: crate::engine::format_elapsed(0),
                ..Default::default()
            }),
        }
    }

    fn update(&self, event: &str, apply: impl FnOnce(&mut SurfaceSnapshot)) {
        let snapshot = match self.snapshot.lock() {
            Ok(mut snap) => {
                apply(&mut snap);
                snap.clone()
            }
            Err(e) => {
                warn!("[SURFACE] Mutex poisoned: {}", e);
                return;
            }
        };
        self.render(event, &snapshot);
    }

    fn render(&self, event: &str, snapshot: &SurfaceSnapshot) {
        let mut out = std::io::stdout().lock();
        let written = match self.format {
            OutputFormat::Text => {
                let label = if snapshot.running { RUNNING_LABEL } else { "START" };
                let marker = if snapshot.golden { "*" } else { " " };
                write!(
                    out,
                    "\r{} {} [{}] {:<12}",
                    marker, snapshot.timer_text, label, snapshot.golden_text
                )
            }
            OutputFormat::Json => {
                let line = serde_json::json!({ "event": event, "payload": snapshot });
                writeln!(out, "{}", line)
            }
        };
        if let Err(e) = written.and_then(|_| out.flush()) {
            warn!("[SURFACE] Failed to write to stdout: {}", e);
        }
    }
}

impl Surface for ConsoleSurface {
    fn set_timer_text(&self, text: &str) {
        self.update(events::TIMER_TICK, |snap| snap.timer_text = text.to_string());
    }

    fn set_running(&self, running: bool) {
        self.update(events::RUNNING_STATE_UPDATE, |snap| snap.running = running);
    }

    fn set_golden(&self, active: bool, text: &str) {
        self.update(events::GOLDEN_STATE_UPDATE, |snap| {
            snap.golden = active;
            snap.golden_text = text.to_string();
        });
    }
}
