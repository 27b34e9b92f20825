//! Download job tracker: submit, observe, dispatch, tear down.
//!
//! [`DownloadTracker`] submits one [`TransferRequest`] to a
//! [`TransferBackend`], then observes the job from a spawned task that
//! composes the backend's two notification channels in a single `select!`
//! loop: the coalescing change tick (poll [`TransferBackend::query`] to learn
//! what changed) and the terminal-completion broadcast. Observed transitions
//! become ordered [`DownloadListener`] callbacks; a terminal transition is
//! followed by exactly one `on_completed`, after which the task exits and
//! drops both receivers.
//!
//! Teardown is idempotent: [`DownloadTracker::cancel_tracking`] may be called
//! any number of times, before or after natural termination, and dropping the
//! tracker cancels tracking as well.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::backend::{BackendError, JobId, JobStatus, TransferBackend};
use crate::listener::DownloadListener;
use crate::reason::reason_text;
use crate::request::TransferRequest;
use crate::storage::{StorageError, ensure_writable_parent};

/// Errors returned synchronously by [`DownloadTracker::submit`].
///
/// Transfer failures never appear here; they reach the listener as
/// `on_failed` callbacks with a reason code.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The request URL is empty or does not parse as an absolute URL.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        /// The URL that was rejected.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The destination path cannot name a file.
    #[error("invalid destination: {0}")]
    InvalidDestination(#[source] StorageError),

    /// The destination directory cannot be created or written at call time.
    #[error(transparent)]
    Io(StorageError),

    /// This tracker already accepted a job; one tracker tracks one job.
    #[error("a job was already submitted to this tracker")]
    AlreadySubmitted,

    /// The backend refused the request at enqueue time.
    #[error("backend refused the request: {0}")]
    Backend(#[from] BackendError),
}

impl From<StorageError> for SubmitError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NoParent { .. } => Self::InvalidDestination(error),
            StorageError::Create { .. } | StorageError::NotWritable { .. } => Self::Io(error),
        }
    }
}

/// State shared between the tracker handle and its observation task.
struct TrackerShared {
    /// At most one active listener; replaced wholesale by `set_listener`.
    listener: Mutex<Option<Arc<dyn DownloadListener>>>,
    /// Set by `cancel_tracking`; checked immediately before every callback.
    cancelled: AtomicBool,
}

/// Tracks a single download job through an abstract transfer backend.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use downtrack_core::{
///     ChannelListener, DownloadTracker, HttpBackend, RetryPolicy, TransferRequest,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = Arc::new(HttpBackend::new(RetryPolicy::default())?);
/// let tracker = DownloadTracker::new(backend);
///
/// let (listener, mut events) = ChannelListener::channel();
/// tracker.set_listener(Arc::new(listener));
///
/// let request = TransferRequest::new("https://example.com/data.bin", "/tmp/data.bin")
///     .with_title("data");
/// let id = tracker.submit(request).await?;
/// println!("submitted as {id}");
///
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct DownloadTracker {
    backend: Arc<dyn TransferBackend>,
    shared: Arc<TrackerShared>,
    /// Guards the one-job-per-tracker rule; reset if a submit fails.
    submitted: AtomicBool,
    job: OnceLock<JobId>,
    cancel_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for DownloadTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTracker")
            .field("job", &self.job_id())
            .field("cancelled", &self.shared.cancelled.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DownloadTracker {
    /// Creates a tracker over the given backend. No job is submitted yet.
    #[must_use]
    pub fn new(backend: Arc<dyn TransferBackend>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            backend,
            shared: Arc::new(TrackerShared {
                listener: Mutex::new(None),
                cancelled: AtomicBool::new(false),
            }),
            submitted: AtomicBool::new(false),
            job: OnceLock::new(),
            cancel_tx,
        }
    }

    /// Replaces the active listener.
    ///
    /// Callable before or after submission. Events observed before the
    /// listener was registered are not replayed.
    pub fn set_listener(&self, listener: Arc<dyn DownloadListener>) {
        let mut slot = self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(listener);
    }

    /// The job id assigned at submission, if a job was submitted.
    #[must_use]
    pub fn job_id(&self) -> Option<JobId> {
        self.job.get().copied()
    }

    /// Validates the request, enqueues it, and starts observation.
    ///
    /// Validation strictly precedes any backend interaction: on a validation
    /// failure no job is created and no observation is registered. A failed
    /// submit leaves the tracker unused, so it may be retried.
    ///
    /// # Errors
    ///
    /// [`SubmitError::InvalidUrl`] for an empty or unparseable URL,
    /// [`SubmitError::InvalidDestination`] for a path that cannot name a
    /// file, [`SubmitError::Io`] when the destination directory cannot be
    /// created or written, [`SubmitError::AlreadySubmitted`] on a second
    /// submission, and [`SubmitError::Backend`] when the backend refuses the
    /// request.
    #[instrument(skip(self, request), fields(url = %request.url()))]
    pub async fn submit(&self, request: TransferRequest) -> Result<JobId, SubmitError> {
        if self.submitted.swap(true, Ordering::SeqCst) {
            return Err(SubmitError::AlreadySubmitted);
        }

        match self.try_submit(&request).await {
            Ok(id) => Ok(id),
            Err(error) => {
                self.submitted.store(false, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    async fn try_submit(&self, request: &TransferRequest) -> Result<JobId, SubmitError> {
        Url::parse(request.url()).map_err(|source| SubmitError::InvalidUrl {
            url: request.url().to_string(),
            source,
        })?;
        ensure_writable_parent(request.destination())?;

        let id = self.backend.enqueue(request).await?;
        let _ = self.job.set(id);
        info!(job = %id, destination = %request.destination().display(), "job submitted");

        let change_rx = self.backend.subscribe();
        let completion_rx = self.backend.subscribe_completion();
        let cancel_rx = self.cancel_tx.subscribe();

        tokio::spawn(observe_job(
            Arc::clone(&self.backend),
            Arc::clone(&self.shared),
            id,
            request.destination().to_path_buf(),
            change_rx,
            completion_rx,
            cancel_rx,
        ));

        Ok(id)
    }

    /// Stops observation and suppresses further listener callbacks.
    ///
    /// Idempotent: calling it again, or after natural termination, is a
    /// no-op. A callback already past its cancellation check may still be
    /// delivered.
    pub fn cancel_tracking(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_tx.send_replace(true);
        debug!(job = ?self.job_id(), "tracking cancelled");
    }
}

impl Drop for DownloadTracker {
    fn drop(&mut self) {
        self.cancel_tracking();
    }
}

/// Observes one job until terminal state, cancellation, or backend shutdown.
///
/// The subscriptions only carry changes that happen after they were created,
/// so the loop polls once up front to observe whatever state the job is
/// already in — including a terminal state reached before the task started.
async fn observe_job(
    backend: Arc<dyn TransferBackend>,
    shared: Arc<TrackerShared>,
    id: JobId,
    requested_destination: PathBuf,
    mut change_rx: watch::Receiver<()>,
    mut completion_rx: broadcast::Receiver<JobId>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut dispatcher = EventDispatcher::new(shared, id);

    if poll_and_dispatch(backend.as_ref(), &mut dispatcher, &requested_destination).await {
        return;
    }

    loop {
        tokio::select! {
            biased;

            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    debug!(job = %id, "observation cancelled");
                    break;
                }
            }

            received = completion_rx.recv() => match received {
                Ok(done) if done == id => {
                    // The terminal status is already visible to `query` by
                    // the time the signal is observable.
                    poll_and_dispatch(backend.as_ref(), &mut dispatcher, &requested_destination)
                        .await;
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // Our signal may be among the skipped ones.
                    warn!(job = %id, skipped, "completion channel lagged, polling");
                    if poll_and_dispatch(
                        backend.as_ref(),
                        &mut dispatcher,
                        &requested_destination,
                    )
                    .await
                    {
                        break;
                    }
                }
                Err(RecvError::Closed) => {
                    debug!(job = %id, "completion channel closed");
                    break;
                }
            },

            changed = change_rx.changed() => {
                if changed.is_err() {
                    debug!(job = %id, "change channel closed");
                    break;
                }
                if poll_and_dispatch(backend.as_ref(), &mut dispatcher, &requested_destination)
                    .await
                {
                    break;
                }
            }
        }
    }

    // Receivers drop here: observation resources are released exactly once.
    debug!(job = %id, "observation finished");
}

/// Queries the backend once and dispatches the observed state.
///
/// Returns true when observation should stop (terminal state dispatched).
/// A `None` snapshot or a query error keeps observation alive: the backend
/// may simply not report the job yet.
async fn poll_and_dispatch(
    backend: &dyn TransferBackend,
    dispatcher: &mut EventDispatcher,
    requested_destination: &Path,
) -> bool {
    let id = dispatcher.id;
    let snapshot = match backend.query(id).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            debug!(job = %id, "backend reports no snapshot yet");
            return false;
        }
        Err(error) => {
            warn!(job = %id, %error, "query failed, observation continues");
            return false;
        }
    };

    match snapshot.status {
        JobStatus::Pending => {
            dispatcher.pending();
            false
        }
        JobStatus::Running => {
            dispatcher.running(snapshot.bytes_downloaded, snapshot.bytes_total);
            false
        }
        JobStatus::Paused => {
            dispatcher.paused(snapshot.reason_code);
            false
        }
        JobStatus::Failed => {
            dispatcher.failed(snapshot.reason_code);
            true
        }
        JobStatus::Successful => {
            let final_path = match backend.resolve_final_path(id).await {
                Ok(Some(path)) => path,
                Ok(None) => {
                    warn!(job = %id, "no final path for successful job, using requested destination");
                    requested_destination.to_path_buf()
                }
                Err(error) => {
                    warn!(job = %id, %error, "final path lookup failed, using requested destination");
                    requested_destination.to_path_buf()
                }
            };
            dispatcher.successful(&final_path);
            true
        }
    }
}

/// Translates observed snapshots into listener callbacks.
///
/// Enforces the delivery rules: `on_pending` on entry only, `on_running` for
/// every observation while running, `on_paused` on entering a pause or on a
/// reason change, one terminal callback, and `on_completed` exactly once and
/// never before the terminal callback.
struct EventDispatcher {
    shared: Arc<TrackerShared>,
    id: JobId,
    last_status: Option<JobStatus>,
    last_reason_code: u32,
    finished: bool,
}

impl EventDispatcher {
    fn new(shared: Arc<TrackerShared>, id: JobId) -> Self {
        Self {
            shared,
            id,
            last_status: None,
            last_reason_code: 0,
            finished: false,
        }
    }

    fn pending(&mut self) {
        if self.last_status == Some(JobStatus::Pending) {
            return;
        }
        self.last_status = Some(JobStatus::Pending);
        debug!(job = %self.id, "pending");
        self.emit(|listener| listener.on_pending());
    }

    fn running(&mut self, bytes_downloaded: u64, bytes_total: Option<u64>) {
        self.last_status = Some(JobStatus::Running);
        self.emit(|listener| listener.on_running(bytes_downloaded, bytes_total));
    }

    fn paused(&mut self, reason_code: u32) {
        let entered = self.last_status != Some(JobStatus::Paused);
        if !entered && self.last_reason_code == reason_code {
            return;
        }
        self.last_status = Some(JobStatus::Paused);
        self.last_reason_code = reason_code;
        let reason = reason_text(reason_code);
        info!(job = %self.id, reason_code, reason, "paused");
        self.emit(|listener| listener.on_paused(reason_code, reason));
    }

    fn failed(&mut self, reason_code: u32) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.last_status = Some(JobStatus::Failed);
        let reason = reason_text(reason_code);
        warn!(job = %self.id, reason_code, reason, "failed");
        self.emit(|listener| listener.on_failed(reason_code, reason));
        self.completed();
    }

    fn successful(&mut self, final_path: &Path) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.last_status = Some(JobStatus::Successful);
        info!(job = %self.id, path = %final_path.display(), "successful");
        self.emit(|listener| listener.on_successful(final_path));
        self.completed();
    }

    fn completed(&self) {
        debug!(job = %self.id, "completed");
        self.emit(|listener| listener.on_completed());
    }

    /// Invokes the listener unless tracking has been cancelled.
    ///
    /// The cancellation flag is checked immediately before the call. The
    /// listener is cloned out of the slot first, so a callback can never
    /// deadlock against a concurrent `set_listener`.
    fn emit(&self, call: impl FnOnce(&dyn DownloadListener)) {
        if self.shared.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let listener = self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            call(listener.as_ref());
        }
    }
}
