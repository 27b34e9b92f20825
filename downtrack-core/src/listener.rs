//! Listener contract, event values, and a channel adapter.
//!
//! A [`DownloadListener`] receives the tracker's event sequence through
//! synchronous callbacks. Every method has a default no-op body, so a
//! listener overrides only the events it cares about.
//!
//! Async consumers (and tests) that would rather receive events as values
//! use [`ChannelListener`], which forwards each callback as a
//! [`TrackerEvent`] over an unbounded mpsc channel.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::mpsc;

/// Receives ordered lifecycle events for one tracked download job.
///
/// At most one listener is active per job; the tracker replaces the previous
/// listener when a new one is set. Callbacks are invoked from the tracker's
/// observation context; implementations must not assume a specific thread.
#[allow(unused_variables)]
pub trait DownloadListener: Send + Sync {
    /// The backend accepted the job but has not started transferring.
    fn on_pending(&self) {}

    /// Bytes are being transferred. Fired on every observed change while
    /// the job is running; `bytes_total` is `None` until the backend knows
    /// the final size.
    fn on_running(&self, bytes_downloaded: u64, bytes_total: Option<u64>) {}

    /// The backend suspended the transfer. `reason` is the symbolic name
    /// for `reason_code` (see [`crate::reason`]).
    fn on_paused(&self, reason_code: u32, reason: &str) {}

    /// Terminal: the transfer failed. `reason` is the symbolic name for
    /// `reason_code`.
    fn on_failed(&self, reason_code: u32, reason: &str) {}

    /// Terminal: the transfer finished; `final_path` is the actual on-disk
    /// location, which may differ from the requested destination if the
    /// backend renamed on collision.
    fn on_successful(&self, final_path: &Path) {}

    /// The job reached a terminal state (successful or failed). Fired
    /// exactly once, after the terminal event.
    fn on_completed(&self) {}
}

/// One tracker event as a value, mirroring [`DownloadListener`] callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// Job accepted, transfer not yet started.
    Pending,
    /// Transfer progress.
    Running {
        /// Bytes transferred so far.
        bytes_downloaded: u64,
        /// Expected total size, when known.
        bytes_total: Option<u64>,
    },
    /// Transfer suspended.
    Paused {
        /// Backend pause reason code.
        reason_code: u32,
        /// Symbolic name for the reason code.
        reason: String,
    },
    /// Terminal failure.
    Failed {
        /// Backend failure reason code.
        reason_code: u32,
        /// Symbolic name for the reason code.
        reason: String,
    },
    /// Terminal success.
    Successful {
        /// Actual on-disk location of the downloaded artifact.
        final_path: PathBuf,
    },
    /// Fired exactly once after any terminal outcome.
    Completed,
}

/// Listener that forwards every event over an unbounded mpsc channel.
///
/// The sender side never blocks (listener callbacks are synchronous); a
/// dropped receiver silently discards further events.
///
/// # Example
///
/// ```
/// use downtrack_core::{ChannelListener, DownloadListener, TrackerEvent};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (listener, mut events) = ChannelListener::channel();
/// listener.on_pending();
/// assert_eq!(events.recv().await, Some(TrackerEvent::Pending));
/// # }
/// ```
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<TrackerEvent>,
}

impl ChannelListener {
    /// Creates a listener plus the receiving half of its event channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: TrackerEvent) {
        // A closed receiver just means nobody is consuming anymore.
        let _ = self.tx.send(event);
    }
}

impl DownloadListener for ChannelListener {
    fn on_pending(&self) {
        self.forward(TrackerEvent::Pending);
    }

    fn on_running(&self, bytes_downloaded: u64, bytes_total: Option<u64>) {
        self.forward(TrackerEvent::Running {
            bytes_downloaded,
            bytes_total,
        });
    }

    fn on_paused(&self, reason_code: u32, reason: &str) {
        self.forward(TrackerEvent::Paused {
            reason_code,
            reason: reason.to_string(),
        });
    }

    fn on_failed(&self, reason_code: u32, reason: &str) {
        self.forward(TrackerEvent::Failed {
            reason_code,
            reason: reason.to_string(),
        });
    }

    fn on_successful(&self, final_path: &Path) {
        self.forward(TrackerEvent::Successful {
            final_path: final_path.to_path_buf(),
        });
    }

    fn on_completed(&self) {
        self.forward(TrackerEvent::Completed);
    }
}
