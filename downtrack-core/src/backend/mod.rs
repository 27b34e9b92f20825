//! Transfer backend contract.
//!
//! The tracker never performs transfers itself; it talks to a
//! [`TransferBackend`], the external engine that owns the actual network
//! work. The contract is deliberately small: enqueue a request, snapshot a
//! job's state, resolve the final on-disk path after success, and two push
//! notification channels — a coalescing "something changed" tick and a
//! terminal-completion signal keyed by job id.
//!
//! [`HttpBackend`] is the reference implementation shipped with this crate.
//!
//! # Object Safety
//!
//! The trait uses `async_trait` to support dynamic dispatch via
//! `Arc<dyn TransferBackend>`. Rust 2024 native async traits are not
//! object-safe, so `async_trait` is required here.

mod http;
mod retry;

pub use http::HttpBackend;
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::request::TransferRequest;

/// Backend-assigned opaque job identifier.
///
/// Assigned once at enqueue and stable for the job's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(u64);

impl JobId {
    /// Wraps a raw backend identifier.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of one job as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted by the backend, transfer not yet started.
    Pending,
    /// Bytes are being transferred.
    Running,
    /// Transfer suspended; the snapshot carries a pause reason code.
    Paused,
    /// Terminal: the artifact was written to its final path.
    Successful,
    /// Terminal: the transfer failed; the snapshot carries a failure
    /// reason code.
    Failed,
}

impl JobStatus {
    /// Returns true for [`JobStatus::Successful`] and [`JobStatus::Failed`];
    /// no further transitions occur after a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

/// Single-job status snapshot returned by [`TransferBackend::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Pause/failure reason code; 0 when the status carries no reason.
    pub reason_code: u32,
    /// Bytes transferred so far.
    pub bytes_downloaded: u64,
    /// Expected total size, when the backend knows it.
    pub bytes_total: Option<u64>,
}

impl JobSnapshot {
    /// Snapshot for a job that was accepted but has not started.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            reason_code: 0,
            bytes_downloaded: 0,
            bytes_total: None,
        }
    }

    /// Snapshot for a running job with the given progress.
    #[must_use]
    pub fn running(bytes_downloaded: u64, bytes_total: Option<u64>) -> Self {
        Self {
            status: JobStatus::Running,
            reason_code: 0,
            bytes_downloaded,
            bytes_total,
        }
    }

    /// Snapshot for a paused job; progress so far is retained.
    #[must_use]
    pub fn paused(reason_code: u32, bytes_downloaded: u64, bytes_total: Option<u64>) -> Self {
        Self {
            status: JobStatus::Paused,
            reason_code,
            bytes_downloaded,
            bytes_total,
        }
    }

    /// Snapshot for a failed job.
    #[must_use]
    pub fn failed(reason_code: u32) -> Self {
        Self {
            status: JobStatus::Failed,
            reason_code,
            bytes_downloaded: 0,
            bytes_total: None,
        }
    }

    /// Snapshot for a successfully completed job.
    #[must_use]
    pub fn successful(bytes_total: u64) -> Self {
        Self {
            status: JobStatus::Successful,
            reason_code: 0,
            bytes_downloaded: bytes_total,
            bytes_total: Some(bytes_total),
        }
    }
}

/// Errors raised by backend operations.
///
/// These cover the backend's own plumbing (client construction, reachability).
/// Transfer failures are never errors here; they surface as
/// [`JobStatus::Failed`] snapshots with a reason code.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The backend could not accept or answer an operation.
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the condition.
        message: String,
    },
}

impl BackendError {
    /// Creates a client-construction error.
    pub fn client(source: reqwest::Error) -> Self {
        Self::Client { source }
    }

    /// Creates an unavailable-backend error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// External subsystem that performs the actual network transfer.
///
/// Implementations must uphold one ordering contract: by the time a
/// completion signal for a job is observable on the
/// [`subscribe_completion`](Self::subscribe_completion) channel, a
/// [`query`](Self::query) for that job reports a terminal status.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Accepts a transfer request and returns the assigned job identifier.
    async fn enqueue(&self, request: &TransferRequest) -> Result<JobId, BackendError>;

    /// Returns the current snapshot for `id`, or `None` for a job the
    /// backend does not know (never enqueued, or evicted).
    async fn query(&self, id: JobId) -> Result<Option<JobSnapshot>, BackendError>;

    /// Returns the actual on-disk location of a downloaded artifact, or
    /// `None` for an unknown job. May differ from the requested destination
    /// if the backend renamed on collision.
    async fn resolve_final_path(&self, id: JobId) -> Result<Option<PathBuf>, BackendError>;

    /// Subscribes to the coalescing change tick: *some* job's state
    /// changed; the consumer must [`query`](Self::query) to learn what.
    /// A slow consumer observes at-most-latest state, not every change.
    fn subscribe(&self) -> watch::Receiver<()>;

    /// Subscribes to terminal-completion signals keyed by job id.
    fn subscribe_completion(&self) -> broadcast::Receiver<JobId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_display_and_value() {
        let id = JobId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.value(), 42);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Successful.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
    }

    #[test]
    fn test_snapshot_constructors() {
        let pending = JobSnapshot::pending();
        assert_eq!(pending.status, JobStatus::Pending);
        assert_eq!(pending.reason_code, 0);

        let running = JobSnapshot::running(50, Some(100));
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.bytes_downloaded, 50);
        assert_eq!(running.bytes_total, Some(100));

        let paused = JobSnapshot::paused(crate::reason::PAUSED_WAITING_TO_RETRY, 30, Some(100));
        assert_eq!(paused.status, JobStatus::Paused);
        assert_eq!(paused.reason_code, 1);
        assert_eq!(paused.bytes_downloaded, 30);

        let failed = JobSnapshot::failed(crate::reason::ERROR_INSUFFICIENT_SPACE);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.reason_code, 1008);

        let successful = JobSnapshot::successful(100);
        assert_eq!(successful.status, JobStatus::Successful);
        assert_eq!(successful.bytes_downloaded, 100);
        assert_eq!(successful.bytes_total, Some(100));
    }

    #[test]
    fn test_backend_error_display() {
        let error = BackendError::unavailable("daemon shut down");
        let msg = error.to_string();
        assert!(msg.contains("unavailable"), "expected class in: {msg}");
        assert!(msg.contains("daemon shut down"), "expected detail in: {msg}");
    }
}
