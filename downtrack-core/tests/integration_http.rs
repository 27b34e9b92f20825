//! Integration matrix: tracker over the real HTTP backend against wiremock.
//!
//! Covers: the full successful flow with progress monotonicity, HTTP failure
//! mapping, pause/resume through the retry machinery, collision renaming,
//! and the terminal-before-completion-signal ordering contract.

use std::sync::Arc;
use std::time::Duration;

use downtrack_core::{
    ChannelListener, DownloadTracker, HttpBackend, JobStatus, RetryPolicy, TrackerEvent,
    TransferBackend, TransferRequest,
};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

/// Receives events until `Completed`, with a hang guard.
async fn collect_until_completed(
    events: &mut UnboundedReceiver<TrackerEvent>,
) -> Vec<TrackerEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for tracker events")
            .expect("event channel closed before Completed");
        let done = event == TrackerEvent::Completed;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn running_progress(events: &[TrackerEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            TrackerEvent::Running {
                bytes_downloaded, ..
            } => Some(*bytes_downloaded),
            _ => None,
        })
        .collect()
}

fn tracked_backend(policy: RetryPolicy) -> (DownloadTracker, UnboundedReceiver<TrackerEvent>) {
    let backend = Arc::new(HttpBackend::new(policy).expect("backend"));
    let tracker = DownloadTracker::new(backend);
    let (listener, events) = ChannelListener::channel();
    tracker.set_listener(Arc::new(listener));
    (tracker, events)
}

#[tokio::test]
async fn test_successful_download_event_sequence_and_artifact() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    let body = vec![0x5a_u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let destination = temp_dir.path().join("data.bin");
    let (tracker, mut events) = tracked_backend(RetryPolicy::default());

    let request = TransferRequest::new(format!("{}/data.bin", mock_server.uri()), &destination)
        .with_title("integration artifact");
    tracker.submit(request).await.expect("submit");

    let seen = collect_until_completed(&mut events).await;

    // Completed is last and unique; the terminal event directly precedes it.
    assert_eq!(seen.last(), Some(&TrackerEvent::Completed));
    assert_eq!(
        seen.iter()
            .filter(|event| **event == TrackerEvent::Completed)
            .count(),
        1
    );
    assert_eq!(
        seen.get(seen.len() - 2),
        Some(&TrackerEvent::Successful {
            final_path: destination.clone()
        })
    );
    let interrupted = seen
        .iter()
        .any(|event| matches!(event, TrackerEvent::Failed { .. } | TrackerEvent::Paused { .. }));
    assert!(
        !interrupted,
        "clean download must not report pauses or failures: {seen:?}"
    );

    // Progress never goes backwards within a single running segment.
    let progress = running_progress(&seen);
    assert!(
        progress.windows(2).all(|pair| pair[0] <= pair[1]),
        "progress must be monotonic: {progress:?}"
    );

    let written = std::fs::read(&destination).expect("artifact");
    assert_eq!(written, body);
}

#[tokio::test]
async fn test_http_404_fails_with_unhandled_http_code() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let destination = temp_dir.path().join("missing.bin");
    let (tracker, mut events) = tracked_backend(RetryPolicy::default());

    let request = TransferRequest::new(format!("{}/missing.bin", mock_server.uri()), &destination);
    tracker.submit(request).await.expect("submit");

    let seen = collect_until_completed(&mut events).await;

    assert_eq!(
        seen.get(seen.len() - 2),
        Some(&TrackerEvent::Failed {
            reason_code: 1002,
            reason: "ERROR_UNHANDLED_HTTP_CODE".to_string()
        })
    );
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, TrackerEvent::Successful { .. })),
        "a 404 must not produce a success event: {seen:?}"
    );
    assert!(
        !destination.exists(),
        "no artifact may be written for a failed response"
    );
}

#[tokio::test]
async fn test_transient_503_pauses_then_succeeds() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    // First request hits the one-shot 503; the retry gets the real body.
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"recovered".to_vec()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let destination = temp_dir.path().join("flaky.bin");

    // Long enough for the pause to be observed, short enough for tests.
    let policy = RetryPolicy::new(
        3,
        Duration::from_millis(200),
        Duration::from_millis(500),
        2.0,
    );
    let (tracker, mut events) = tracked_backend(policy);

    let request = TransferRequest::new(format!("{}/flaky.bin", mock_server.uri()), &destination);
    tracker.submit(request).await.expect("submit");

    let seen = collect_until_completed(&mut events).await;

    assert!(
        seen.contains(&TrackerEvent::Paused {
            reason_code: 1,
            reason: "PAUSED_WAITING_TO_RETRY".to_string()
        }),
        "transient failure must surface as a retry pause: {seen:?}"
    );
    assert_eq!(
        seen.get(seen.len() - 2),
        Some(&TrackerEvent::Successful {
            final_path: destination.clone()
        })
    );

    let written = std::fs::read(&destination).expect("artifact");
    assert_eq!(written, b"recovered");
}

#[tokio::test]
async fn test_existing_destination_is_renamed_not_overwritten() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new report".to_vec()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let destination = temp_dir.path().join("report.pdf");
    std::fs::write(&destination, b"old report").expect("seed existing file");

    let (tracker, mut events) = tracked_backend(RetryPolicy::default());
    let request = TransferRequest::new(format!("{}/report.pdf", mock_server.uri()), &destination);
    tracker.submit(request).await.expect("submit");

    let seen = collect_until_completed(&mut events).await;

    let renamed = temp_dir.path().join("report_1.pdf");
    assert_eq!(
        seen.get(seen.len() - 2),
        Some(&TrackerEvent::Successful {
            final_path: renamed.clone()
        })
    );

    // The original stays untouched; the artifact lands next to it.
    assert_eq!(std::fs::read(&destination).expect("original"), b"old report");
    assert_eq!(std::fs::read(&renamed).expect("artifact"), b"new report");
}

#[tokio::test]
async fn test_completion_signal_implies_terminal_query() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/tiny.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let backend = HttpBackend::new(RetryPolicy::default()).expect("backend");

    let mut completions = backend.subscribe_completion();
    let request = TransferRequest::new(
        format!("{}/tiny.bin", mock_server.uri()),
        temp_dir.path().join("tiny.bin"),
    );
    let id = backend.enqueue(&request).await.expect("enqueue");

    let done = tokio::time::timeout(Duration::from_secs(30), completions.recv())
        .await
        .expect("timed out waiting for completion")
        .expect("completion channel closed");
    assert_eq!(done, id);

    let snapshot = backend
        .query(id)
        .await
        .expect("query")
        .expect("job must be known");
    assert_eq!(snapshot.status, JobStatus::Successful);
    assert_eq!(snapshot.bytes_downloaded, 1);
}
