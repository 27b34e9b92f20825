//! Downtrack Core Library
//!
//! This library provides an asynchronous download-job tracker: a component
//! that submits one download request to an external transfer backend,
//! observes it for state transitions, and dispatches a well-defined event
//! sequence to a caller-supplied listener, with at-most-one active listener
//! and idempotent teardown of observation resources.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`backend`] - Transfer backend contract plus a reference HTTP implementation
//! - [`listener`] - Listener contract, event values, and a channel adapter
//! - [`reason`] - Pause/failure reason-code vocabulary and translation
//! - [`request`] - Immutable transfer request value
//! - [`storage`] - Destination directory checks performed at submit time
//! - [`tracker`] - The download job tracker itself

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod listener;
pub mod reason;
pub mod request;
pub mod storage;
pub mod tracker;

// Re-export commonly used types
pub use backend::{
    BackendError, DEFAULT_MAX_ATTEMPTS, HttpBackend, JobId, JobSnapshot, JobStatus, RetryPolicy,
    TransferBackend,
};
pub use listener::{ChannelListener, DownloadListener, TrackerEvent};
pub use reason::reason_text;
pub use request::TransferRequest;
pub use storage::{StorageError, ensure_writable_parent};
pub use tracker::{DownloadTracker, SubmitError};
