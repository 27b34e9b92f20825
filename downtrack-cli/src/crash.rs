//! Crash report capture for unrecoverable panics.
//!
//! [`CrashReporter`] wraps the process panic hook: while the returned
//! [`ReportGuard`] is alive, any panic writes a timestamped report file
//! (caller-supplied environment info, panic message, location, thread)
//! before the panic continues. Dropping the guard restores the hook that
//! was installed before.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::error;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;
type ExitingHook = Box<dyn Fn(&Path, &str) + Send + Sync + 'static>;

/// Collects crash reports for panics that would otherwise only reach stderr.
pub(crate) struct CrashReporter {
    log_dir: PathBuf,
    info: BTreeMap<String, String>,
    on_exiting: Option<ExitingHook>,
}

impl CrashReporter {
    /// Creates a reporter that writes report files under `log_dir`.
    pub(crate) fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            info: BTreeMap::new(),
            on_exiting: None,
        }
    }

    /// Adds a static key/value pair written at the top of every report.
    #[must_use]
    pub(crate) fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Registers a hook invoked with `(report_path, report_text)` after a
    /// report has been written, before the panic continues.
    #[must_use]
    pub(crate) fn on_exiting(
        mut self,
        hook: impl Fn(&Path, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_exiting = Some(Box::new(hook));
        self
    }

    /// Creates the log directory and installs the panic hook. The returned
    /// guard keeps it active; dropping the guard restores the previous hook.
    pub(crate) fn install(self) -> io::Result<ReportGuard> {
        fs::create_dir_all(&self.log_dir)?;
        let previous = panic::take_hook();
        let reporter = Arc::new(self);
        panic::set_hook(Box::new(move |panic_info| reporter.record(panic_info)));
        Ok(ReportGuard {
            previous: Some(previous),
        })
    }

    fn record(&self, panic_info: &PanicHookInfo<'_>) {
        let thread = std::thread::current();
        let report = self.render_report(
            &panic_message(panic_info),
            panic_info.location().map(ToString::to_string).as_deref(),
            thread.name().unwrap_or("<unnamed>"),
        );
        match self.write_report(&report) {
            Ok(path) => {
                error!(path = %path.display(), "crash report written");
                if let Some(hook) = &self.on_exiting {
                    hook(&path, &report);
                }
            }
            Err(source) => error!(error = %source, "failed to write crash report"),
        }
    }

    fn render_report(&self, message: &str, location: Option<&str>, thread: &str) -> String {
        let mut report = String::new();
        for (key, value) in &self.info {
            report.push_str(&format!("{key}: {value}\n"));
        }
        if !self.info.is_empty() {
            report.push('\n');
        }
        report.push_str(&format!("thread: {thread}\n"));
        report.push_str(&format!("panic: {message}\n"));
        if let Some(location) = location {
            report.push_str(&format!("location: {location}\n"));
        }
        report
    }

    fn write_report(&self, report: &str) -> io::Result<PathBuf> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        let path = self.log_dir.join(format!("crash_{timestamp}.log"));
        fs::write(&path, report)?;
        Ok(path)
    }
}

fn panic_message(panic_info: &PanicHookInfo<'_>) -> String {
    let payload = panic_info.payload();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Keeps the crash-reporting panic hook installed.
pub(crate) struct ReportGuard {
    previous: Option<PanicHook>,
}

impl Drop for ReportGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            drop(panic::take_hook());
            panic::set_hook(previous);
        }
    }
}
