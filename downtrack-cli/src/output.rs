//! Event rendering: progress bar for humans, JSON lines for scripts.

use std::time::Duration;

use anyhow::{Context, Result};
use downtrack_core::TrackerEvent;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// How tracker events reach the user.
pub(crate) enum OutputMode {
    /// One JSON object per event on stdout.
    Json,
    /// indicatif progress bar on stderr.
    Progress(ProgressRenderer),
}

impl OutputMode {
    pub(crate) fn from_args(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Progress(ProgressRenderer::new())
        }
    }

    pub(crate) fn render(&mut self, event: &TrackerEvent) -> Result<()> {
        match self {
            Self::Json => {
                let line = serde_json::to_string(event).context("serializing tracker event")?;
                println!("{line}");
            }
            Self::Progress(renderer) => renderer.render(event),
        }
        Ok(())
    }
}

/// Drives a single progress bar through the tracker's event sequence.
///
/// Starts as a spinner (total size unknown), switches to a bounded bytes
/// bar once the backend reports a total, and leaves a terminal message
/// visible only on failure.
pub(crate) struct ProgressRenderer {
    bar: ProgressBar,
    bounded: bool,
    done: bool,
}

impl ProgressRenderer {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(TICK_INTERVAL);
        bar.set_message("submitting...");
        Self {
            bar,
            bounded: false,
            done: false,
        }
    }

    fn render(&mut self, event: &TrackerEvent) {
        match event {
            TrackerEvent::Pending => self.bar.set_message("pending..."),
            TrackerEvent::Running {
                bytes_downloaded,
                bytes_total,
            } => match bytes_total {
                Some(total) => {
                    if !self.bounded {
                        self.switch_to_bounded(*total);
                    }
                    self.bar.set_position(*bytes_downloaded);
                }
                None => self
                    .bar
                    .set_message(format!("{} downloaded", HumanBytes(*bytes_downloaded))),
            },
            TrackerEvent::Paused { reason, .. } => {
                self.bar.set_message(format!("paused: {reason}"));
            }
            TrackerEvent::Failed {
                reason_code,
                reason,
            } => {
                self.bar
                    .abandon_with_message(format!("failed: {reason} ({reason_code})"));
                self.done = true;
            }
            TrackerEvent::Successful { .. } => {
                self.bar.finish_and_clear();
                self.done = true;
            }
            TrackerEvent::Completed => {
                if !self.done {
                    self.bar.finish_and_clear();
                }
            }
        }
    }

    fn switch_to_bounded(&mut self, total: u64) {
        self.bar.disable_steady_tick();
        self.bar.set_style(
            ProgressStyle::with_template("{bar:30} {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        self.bar.set_length(total);
        self.bar.set_message("");
        self.bounded = true;
    }
}
