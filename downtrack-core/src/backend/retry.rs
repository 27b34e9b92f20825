//! Retry policy for transient transfer failures.
//!
//! When a transfer attempt fails, the failure is classified as transient or
//! permanent. Transient failures with attempts remaining become a *pause*
//! (the job reports [`JobStatus::Paused`](super::JobStatus) with a pause
//! reason, waits out a backoff delay, then restarts); permanent or exhausted
//! failures become a terminal failure reason code.
//!
//! Delays grow exponentially with jitter:
//!
//! ```text
//! delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
//! ```
//!
//! A `Retry-After` header on a 429 response overrides the computed backoff.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::reason;

/// Default maximum transfer attempts (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Maximum honored Retry-After value (1 hour).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// One failed transfer attempt, with enough context to classify it.
#[derive(Debug, Error)]
pub(crate) enum TransferFailure {
    /// The server answered with a non-success status.
    #[error("HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Raw Retry-After header value, when the server sent one.
        retry_after: Option<String>,
    },

    /// The request or body read timed out.
    #[error("timeout")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset).
    #[error("network error: {source}")]
    Network {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The body stream broke mid-transfer.
    #[error("data error: {source}")]
    Body {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Local filesystem failure while writing the artifact.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The redirect limit was exceeded.
    #[error("too many redirects")]
    TooManyRedirects,
}

impl TransferFailure {
    /// Returns true if a retry may succeed.
    ///
    /// Mirrors the usual status-code split: request timeouts, rate limits
    /// and 5xx responses are worth retrying; other 4xx, redirect loops and
    /// local filesystem errors are not.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            Self::Timeout | Self::Network { .. } | Self::Body { .. } => true,
            Self::Io { .. } | Self::TooManyRedirects => false,
        }
    }

    /// The pause reason reported while waiting to retry this failure.
    pub(crate) fn pause_reason(&self) -> u32 {
        match self {
            // No connection at all: the job is waiting for the network.
            Self::Network { .. } => reason::PAUSED_WAITING_FOR_NETWORK,
            _ => reason::PAUSED_WAITING_TO_RETRY,
        }
    }

    /// The terminal failure reason when this failure will not be retried.
    pub(crate) fn failure_reason(&self) -> u32 {
        match self {
            Self::Status { .. } => reason::ERROR_UNHANDLED_HTTP_CODE,
            Self::Timeout | Self::Network { .. } | Self::Body { .. } => {
                reason::ERROR_HTTP_DATA_ERROR
            }
            Self::TooManyRedirects => reason::ERROR_TOO_MANY_REDIRECTS,
            Self::Io { source, .. } => match source.kind() {
                io::ErrorKind::StorageFull => reason::ERROR_INSUFFICIENT_SPACE,
                io::ErrorKind::NotFound => reason::ERROR_DEVICE_NOT_FOUND,
                io::ErrorKind::AlreadyExists => reason::ERROR_FILE_ALREADY_EXISTS,
                _ => reason::ERROR_FILE_ERROR,
            },
        }
    }

    /// The Retry-After delay mandated by the server, when present and parseable.
    fn retry_after_delay(&self) -> Option<Duration> {
        match self {
            Self::Status {
                retry_after: Some(value),
                ..
            } => parse_retry_after(value),
            _ => None,
        }
    }
}

/// What the transfer loop does after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RetryStep {
    /// Report the job paused, wait out `delay`, then start `next_attempt`.
    Pause {
        /// Pause reason code for the paused snapshot.
        reason_code: u32,
        /// How long to wait before retrying.
        delay: Duration,
        /// The attempt number about to start (1-indexed).
        next_attempt: u32,
    },

    /// Report the job failed with `reason_code`.
    GiveUp {
        /// Terminal failure reason code.
        reason_code: u32,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// Defaults: 3 attempts, 1s base delay, 32s cap, multiplier 2.0 — delays of
/// roughly 1s and 2s before giving up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt (typically 2.0 for doubling).
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` counts the initial attempt and is clamped to at
    /// least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom `max_attempts`, defaults otherwise.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether the attempt that just failed should be retried.
    ///
    /// `attempt` is the 1-indexed attempt number that failed. A `Retry-After`
    /// header on the failure overrides the computed backoff delay.
    pub(crate) fn evaluate(&self, failure: &TransferFailure, attempt: u32) -> RetryStep {
        if !failure.is_transient() {
            debug!(%failure, "permanent failure, not retrying");
            return RetryStep::GiveUp {
                reason_code: failure.failure_reason(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryStep::GiveUp {
                reason_code: failure.failure_reason(),
            };
        }

        let delay = failure
            .retry_after_delay()
            .unwrap_or_else(|| self.calculate_delay(attempt));

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryStep::Pause {
            reason_code: failure.pause_reason(),
            delay,
            next_attempt: attempt + 1,
        }
    }

    /// Calculates the delay for a retry attempt with exponential backoff and jitter.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt is 0-indexed for the exponent (attempt 1 = 1x base)
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capped = Duration::from_millis(capped_ms as u64);
        capped + jitter()
    }
}

/// Random jitter between 0 and [`MAX_JITTER`], spreading out simultaneous
/// retries.
fn jitter() -> Duration {
    let mut rng = rand::thread_rng();
    #[allow(clippy::cast_possible_truncation)]
    let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
    Duration::from_millis(jitter_ms)
}

/// Parses a `Retry-After` header value into a delay.
///
/// Supports both RFC 7231 formats — integer seconds and HTTP-date — and
/// caps the result at one hour. Returns `None` for unparseable values.
#[must_use]
pub(crate) fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Integer seconds is the common case.
    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        return match datetime.duration_since(now) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            // Date in the past: retry immediately.
            Err(_) => Some(Duration::ZERO),
        };
    }

    debug!(header_value, "unparseable Retry-After value");
    None
}
