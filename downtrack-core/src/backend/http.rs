//! Reference HTTP implementation of the transfer backend contract.
//!
//! [`HttpBackend`] performs real transfers with `reqwest`, streaming response
//! bodies to disk while maintaining an in-memory job table. Each enqueued job
//! runs in its own Tokio task; the table is the single source of truth that
//! [`query`](super::TransferBackend::query) reads and the change channel
//! announces.
//!
//! Pause states come from the retry machinery: a transient failure marks the
//! job paused with a pause reason, waits out the backoff delay, then restarts
//! the attempt from zero bytes (no byte-range resume).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::retry::{RetryPolicy, RetryStep, TransferFailure};
use super::{BackendError, JobId, JobSnapshot, TransferBackend};
use crate::request::TransferRequest;

/// Connection timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Read timeout in seconds. Applies to the whole request including the body
/// stream, so it must accommodate large downloads.
const READ_TIMEOUT_SECS: u64 = 300;

/// Completion signals buffered per subscriber before it starts lagging.
const COMPLETION_CHANNEL_CAPACITY: usize = 64;

/// Per-job bookkeeping in the job table.
#[derive(Debug)]
struct JobRecord {
    /// Latest state, updated by the transfer task.
    snapshot: JobSnapshot,
    /// Collision-free destination resolved at enqueue time.
    final_path: PathBuf,
}

/// State shared between the backend handle and its transfer tasks.
#[derive(Debug)]
struct Shared {
    jobs: DashMap<JobId, JobRecord>,
    change_tx: watch::Sender<()>,
    completion_tx: broadcast::Sender<JobId>,
}

impl Shared {
    /// Replaces the snapshot for `id` and ticks the change channel.
    fn store(&self, id: JobId, snapshot: JobSnapshot) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.snapshot = snapshot;
        }
        self.change_tx.send_replace(());
    }

    /// Records a terminal snapshot, then fires the completion signal.
    ///
    /// The table write happens first so that a `query` racing the completion
    /// signal always observes the terminal status.
    fn finish(&self, id: JobId, snapshot: JobSnapshot) {
        self.store(id, snapshot);
        let _ = self.completion_tx.send(id);
    }

    fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.get(&id).map(|record| record.snapshot.clone())
    }
}

/// HTTP transfer backend with retry-driven pause states.
///
/// # Example
///
/// ```no_run
/// use downtrack_core::{HttpBackend, RetryPolicy, TransferBackend, TransferRequest};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = HttpBackend::new(RetryPolicy::default())?;
/// let request = TransferRequest::new("https://example.com/data.bin", "/tmp/data.bin");
/// let id = backend.enqueue(&request).await?;
/// println!("queued as {id}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpBackend {
    client: Client,
    policy: RetryPolicy,
    next_id: AtomicU64,
    shared: Arc<Shared>,
}

impl HttpBackend {
    /// Creates a backend with the given retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Client`] if the HTTP client cannot be built.
    pub fn new(policy: RetryPolicy) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(BackendError::client)?;

        let (change_tx, _) = watch::channel(());
        let (completion_tx, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            policy,
            next_id: AtomicU64::new(1),
            shared: Arc::new(Shared {
                jobs: DashMap::new(),
                change_tx,
                completion_tx,
            }),
        })
    }

    /// Returns the retry policy this backend applies to transient failures.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl TransferBackend for HttpBackend {
    #[instrument(skip(self, request), fields(url = %request.url()))]
    async fn enqueue(&self, request: &TransferRequest) -> Result<JobId, BackendError> {
        let id = JobId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let final_path = resolve_unique_destination(request.destination());

        if request.notification_visible() {
            info!(
                job = %id,
                title = request.title().unwrap_or(""),
                destination = %final_path.display(),
                "download queued"
            );
        }

        self.shared.jobs.insert(
            id,
            JobRecord {
                snapshot: JobSnapshot::pending(),
                final_path: final_path.clone(),
            },
        );
        self.shared.change_tx.send_replace(());

        let client = self.client.clone();
        let policy = self.policy.clone();
        let shared = Arc::clone(&self.shared);
        let url = request.url().to_string();
        tokio::spawn(async move {
            run_transfer(&client, &policy, &shared, id, &url, &final_path).await;
        });

        debug!(job = %id, "transfer task spawned");
        Ok(id)
    }

    async fn query(&self, id: JobId) -> Result<Option<JobSnapshot>, BackendError> {
        Ok(self.shared.snapshot(id))
    }

    async fn resolve_final_path(&self, id: JobId) -> Result<Option<PathBuf>, BackendError> {
        Ok(self
            .shared
            .jobs
            .get(&id)
            .map(|record| record.final_path.clone()))
    }

    fn subscribe(&self) -> watch::Receiver<()> {
        self.shared.change_tx.subscribe()
    }

    fn subscribe_completion(&self) -> broadcast::Receiver<JobId> {
        self.shared.completion_tx.subscribe()
    }
}

/// Drives one job to a terminal state, retrying transient failures.
#[instrument(skip(client, policy, shared, url, path), fields(job = %id, url))]
async fn run_transfer(
    client: &Client,
    policy: &RetryPolicy,
    shared: &Shared,
    id: JobId,
    url: &str,
    path: &Path,
) {
    let mut attempt = 1u32;

    loop {
        debug!(attempt, "starting transfer attempt");
        shared.store(id, JobSnapshot::running(0, None));

        match attempt_transfer(client, shared, id, url, path).await {
            Ok(bytes_total) => {
                info!(
                    bytes = bytes_total,
                    path = %path.display(),
                    "transfer complete"
                );
                shared.finish(id, JobSnapshot::successful(bytes_total));
                return;
            }
            Err(failure) => {
                // Never leave partial data behind; a retry rewrites the
                // file from zero.
                let _ = tokio::fs::remove_file(path).await;

                match policy.evaluate(&failure, attempt) {
                    RetryStep::Pause {
                        reason_code,
                        delay,
                        next_attempt,
                    } => {
                        warn!(
                            %failure,
                            attempt,
                            delay_ms = delay.as_millis(),
                            "attempt failed, pausing before retry"
                        );
                        // Progress made so far stays visible while paused.
                        let (bytes, total) = shared
                            .snapshot(id)
                            .map_or((0, None), |s| (s.bytes_downloaded, s.bytes_total));
                        shared.store(id, JobSnapshot::paused(reason_code, bytes, total));
                        tokio::time::sleep(delay).await;
                        attempt = next_attempt;
                    }
                    RetryStep::GiveUp { reason_code } => {
                        warn!(%failure, attempt, reason_code, "transfer failed");
                        shared.finish(id, JobSnapshot::failed(reason_code));
                        return;
                    }
                }
            }
        }
    }
}

/// One transfer attempt: request, stream body to file, flush.
///
/// Returns total bytes written. Every attempt rewrites the file from zero;
/// there is no byte-range resume.
async fn attempt_transfer(
    client: &Client,
    shared: &Shared,
    id: JobId,
    url: &str,
    path: &Path,
) -> Result<u64, TransferFailure> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(classify_request_error)?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        return Err(TransferFailure::Status {
            status: status.as_u16(),
            retry_after,
        });
    }

    let bytes_total = response.content_length();
    shared.store(id, JobSnapshot::running(0, bytes_total));

    let file = File::create(path).await.map_err(|source| TransferFailure::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify_body_error)?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|source| TransferFailure::Io {
                path: path.to_path_buf(),
                source,
            })?;

        bytes_downloaded += chunk.len() as u64;
        shared.store(id, JobSnapshot::running(bytes_downloaded, bytes_total));
    }

    // Ensure all data is flushed to disk
    writer.flush().await.map_err(|source| TransferFailure::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(bytes_downloaded)
}

fn classify_request_error(error: reqwest::Error) -> TransferFailure {
    if error.is_timeout() {
        TransferFailure::Timeout
    } else if error.is_redirect() {
        TransferFailure::TooManyRedirects
    } else if error.is_connect() {
        TransferFailure::Network { source: error }
    } else {
        TransferFailure::Body { source: error }
    }
}

fn classify_body_error(error: reqwest::Error) -> TransferFailure {
    if error.is_timeout() {
        TransferFailure::Timeout
    } else {
        TransferFailure::Body { source: error }
    }
}

/// Resolves a collision-free destination, adding a numeric suffix when the
/// requested path already exists.
fn resolve_unique_destination(requested: &Path) -> PathBuf {
    if !requested.exists() {
        return requested.to_path_buf();
    }

    let dir = requested.parent().unwrap_or_else(|| Path::new("."));
    let filename = requested.file_name().map_or_else(
        || "download.bin".to_string(),
        |name| name.to_string_lossy().into_owned(),
    );

    // Split filename into stem and extension
    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    // Try with numeric suffixes
    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    // Fallback (extremely unlikely)
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}
