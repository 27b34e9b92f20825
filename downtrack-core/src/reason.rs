//! Pause/failure reason-code vocabulary and translation.
//!
//! The transfer backend reports why a job is paused or failed as a small
//! integer code from a fixed enumeration. [`reason_text`] maps each known
//! code to a stable symbolic name for listener consumption; any code outside
//! the vocabulary degrades to `"UNKNOWN"` rather than failing.

/// Job is paused because a transient failure will be retried shortly.
pub const PAUSED_WAITING_TO_RETRY: u32 = 1;

/// Job is paused waiting for network connectivity to proceed.
pub const PAUSED_WAITING_FOR_NETWORK: u32 = 2;

/// Job is paused until a preferred network becomes available.
pub const PAUSED_QUEUED_FOR_PREFERRED_NETWORK: u32 = 3;

/// Job is paused for an unspecified reason.
pub const PAUSED_UNKNOWN: u32 = 4;

/// Job failed for an unspecified reason.
pub const ERROR_UNKNOWN: u32 = 1000;

/// Job failed due to a local file/storage condition.
pub const ERROR_FILE_ERROR: u32 = 1001;

/// Job failed because the server returned an HTTP code the backend
/// does not handle.
pub const ERROR_UNHANDLED_HTTP_CODE: u32 = 1002;

// 1003 is deliberately unassigned, matching the backend vocabulary's gap.

/// Job failed receiving or processing data at the HTTP level.
pub const ERROR_HTTP_DATA_ERROR: u32 = 1004;

/// Job failed because too many redirects were encountered.
pub const ERROR_TOO_MANY_REDIRECTS: u32 = 1005;

/// Job failed because an interrupted transfer cannot be resumed.
pub const ERROR_CANNOT_RESUME: u32 = 1006;

/// Job failed because the storage device was not found.
pub const ERROR_DEVICE_NOT_FOUND: u32 = 1007;

/// Job failed due to insufficient storage space.
pub const ERROR_INSUFFICIENT_SPACE: u32 = 1008;

/// Job failed because the destination file already exists and the
/// backend will not overwrite it.
pub const ERROR_FILE_ALREADY_EXISTS: u32 = 1009;

/// Symbolic name reported for any code outside the known vocabulary.
pub const UNKNOWN_REASON: &str = "UNKNOWN";

/// Translates a backend reason code into its stable symbolic name.
///
/// The mapping is a pure deterministic function of the code. Unrecognized
/// codes (including valid-but-future backend codes) map to
/// [`UNKNOWN_REASON`]; translation never fails.
#[must_use]
pub fn reason_text(code: u32) -> &'static str {
    match code {
        PAUSED_WAITING_TO_RETRY => "PAUSED_WAITING_TO_RETRY",
        PAUSED_WAITING_FOR_NETWORK => "PAUSED_WAITING_FOR_NETWORK",
        PAUSED_QUEUED_FOR_PREFERRED_NETWORK => "PAUSED_QUEUED_FOR_PREFERRED_NETWORK",
        PAUSED_UNKNOWN => "PAUSED_UNKNOWN",
        ERROR_UNKNOWN => "ERROR_UNKNOWN",
        ERROR_FILE_ERROR => "ERROR_FILE_ERROR",
        ERROR_UNHANDLED_HTTP_CODE => "ERROR_UNHANDLED_HTTP_CODE",
        ERROR_HTTP_DATA_ERROR => "ERROR_HTTP_DATA_ERROR",
        ERROR_TOO_MANY_REDIRECTS => "ERROR_TOO_MANY_REDIRECTS",
        ERROR_CANNOT_RESUME => "ERROR_CANNOT_RESUME",
        ERROR_DEVICE_NOT_FOUND => "ERROR_DEVICE_NOT_FOUND",
        ERROR_INSUFFICIENT_SPACE => "ERROR_INSUFFICIENT_SPACE",
        ERROR_FILE_ALREADY_EXISTS => "ERROR_FILE_ALREADY_EXISTS",
        _ => UNKNOWN_REASON,
    }
}
