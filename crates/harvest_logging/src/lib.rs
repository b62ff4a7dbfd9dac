#![deny(missing_docs)]
//! Shared logging utilities for the harvest workspace.
//!
//! This crate provides the `harvest_*` logging macros used across the codebase,
//! a per-thread session label that prefixes every macro-emitted line, and the
//! logger initialisers used by binaries and tests.

use std::cell::RefCell;
use std::fs::File;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

#[doc(hidden)]
pub use log;

thread_local! {
    /// Label of the harvest session currently running on this thread.
    static SESSION_LABEL: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Sets the session label for the current thread.
///
/// Prefer [`scoped_session_label`] or [`with_session_label`], which restore the
/// previous label when they end.
pub fn set_session_label(label: impl Into<String>) {
    let label = label.into();
    SESSION_LABEL.with(|v| *v.borrow_mut() = Some(label));
}

/// Removes the session label for the current thread.
pub fn clear_session_label() {
    SESSION_LABEL.with(|v| *v.borrow_mut() = None);
}

/// Retrieves the session label for the current thread, if one is set.
pub fn session_label() -> Option<String> {
    SESSION_LABEL.with(|v| v.borrow().clone())
}

fn replace_session_label(label: Option<String>) -> Option<String> {
    SESSION_LABEL.with(|v| std::mem::replace(&mut *v.borrow_mut(), label))
}

/// Restores the label that was active before it was created, when dropped.
#[must_use = "the label is restored as soon as the guard is dropped"]
pub struct SessionLabelGuard {
    previous: Option<String>,
}

impl Drop for SessionLabelGuard {
    fn drop(&mut self) {
        replace_session_label(self.previous.take());
    }
}

/// Sets the session label for the current thread until the guard is dropped.
pub fn scoped_session_label(label: impl Into<String>) -> SessionLabelGuard {
    SessionLabelGuard {
        previous: replace_session_label(Some(label.into())),
    }
}

/// Future wrapper that holds a session label only while it is being polled.
///
/// Several labelled futures can share one thread (e.g. joined on a
/// current-thread runtime) and each logs under its own label. Dropping the
/// future mid-run leaves the thread's label as it was.
pub struct WithSessionLabel<F> {
    label: String,
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for WithSessionLabel<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _label = scoped_session_label(this.label.clone());
        this.inner.as_mut().poll(cx)
    }
}

/// Runs `future` under `label`; see [`WithSessionLabel`].
pub fn with_session_label<F: Future>(label: impl Into<String>, future: F) -> WithSessionLabel<F> {
    WithSessionLabel {
        label: label.into(),
        inner: Box::pin(future),
    }
}

/// Prefix inserted by the logging macros: `"[label] "` or the empty string.
#[doc(hidden)]
pub fn label_prefix() -> String {
    SESSION_LABEL.with(|v| match v.borrow().as_deref() {
        Some(label) => format!("[{label}] "),
        None => String::new(),
    })
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!("{}{}", $crate::label_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_info {
    ($($arg:tt)*) => {{
        $crate::log::info!("{}{}", $crate::label_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!("{}{}", $crate::label_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!("{}{}", $crate::label_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_error {
    ($($arg:tt)*) => {{
        $crate::log::error!("{}{}", $crate::label_prefix(), format_args!($($arg)*));
    }};
}

/// Destination for log output.
#[derive(Debug, Clone)]
pub enum LogDestination {
    /// Write to the terminal.
    Terminal,
    /// Write to the given file, truncating it.
    File(PathBuf),
    /// Write to both the terminal and the given file.
    Both(PathBuf),
}

/// Initialize the global logger with the specified destination and level.
///
/// A file that cannot be created is reported on stderr and skipped. Calling this
/// after a logger has been installed is a no-op.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = build_config();

    let loggers: Vec<Box<dyn SharedLogger>> = match destination {
        LogDestination::Terminal => vec![terminal_logger(level, config)],
        LogDestination::File(path) => match create_file_logger(path, level, config) {
            Some(file_logger) => vec![file_logger],
            None => return,
        },
        LogDestination::Both(path) => {
            let mut loggers = vec![terminal_logger(level, config.clone())];
            if let Some(file_logger) = create_file_logger(path, level, config) {
                loggers.push(file_logger);
            }
            loggers
        }
    };

    let _ = CombinedLogger::init(loggers);
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![terminal_logger(level, Config::default())]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn terminal_logger(level: LevelFilter, config: Config) -> Box<dyn SharedLogger> {
    TermLogger::new(level, config, TerminalMode::Mixed, ColorChoice::Auto)
}

fn create_file_logger(
    path: PathBuf,
    level: LevelFilter,
    config: Config,
) -> Option<Box<dyn SharedLogger>> {
    match File::create(&path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", path, err);
            None
        }
    }
}
