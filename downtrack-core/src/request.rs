//! Immutable transfer request value.
//!
//! A [`TransferRequest`] is built once before submission and passed to the
//! tracker as a single argument. Display metadata is optional and passed
//! through to the backend unchanged.

use std::path::{Path, PathBuf};

/// One download request: source URL, local destination, and display metadata.
///
/// Constructed with [`TransferRequest::new`] plus consuming `with_*` methods,
/// so a request is fully configured before it is submitted and cannot change
/// afterwards.
///
/// # Example
///
/// ```
/// use downtrack_core::TransferRequest;
///
/// let request = TransferRequest::new("https://example.com/file.bin", "/tmp/out/file.bin")
///     .with_title("example file")
///     .with_description("demo transfer")
///     .with_notification_visible(true);
/// assert_eq!(request.url(), "https://example.com/file.bin");
/// ```
#[derive(Debug, Clone)]
pub struct TransferRequest {
    url: String,
    destination: PathBuf,
    title: Option<String>,
    description: Option<String>,
    notification_visible: bool,
}

impl TransferRequest {
    /// Creates a request for `url` to be written to `destination`.
    ///
    /// No validation happens here; the tracker validates the URL and
    /// destination at submit time so failures are reported through one
    /// channel.
    #[must_use]
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            title: None,
            description: None,
            notification_visible: false,
        }
    }

    /// Sets the display title passed through to the backend.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the display description passed through to the backend.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Controls whether the backend surfaces a user-visible notification.
    #[must_use]
    pub fn with_notification_visible(mut self, visible: bool) -> Self {
        self.notification_visible = visible;
        self
    }

    /// The source resource locator.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The requested local destination path.
    ///
    /// The backend may rename on collision; the path reported to
    /// `on_successful` is the actual final location.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The display title, if set.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// The display description, if set.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether the backend should surface a user-visible notification.
    #[must_use]
    pub fn notification_visible(&self) -> bool {
        self.notification_visible
    }
}
