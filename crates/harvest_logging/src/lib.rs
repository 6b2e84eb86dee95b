#![deny(missing_docs)]
//! Shared logging utilities for the harvester workspace.
//!
//! This crate provides the `harvest_*` logging macros used across the codebase,
//! a post-scoped logging context, and a minimal test initializer for the
//! global logger.

use std::cell::Cell;

thread_local! {
    /// Thread-local storage for the post currently being harvested.
    static CURRENT_POST: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Returns the id of the post currently being harvested on this thread, if any.
pub fn current_post() -> Option<u64> {
    CURRENT_POST.with(|v| v.get())
}

/// Marks `post_id` as the current post until the returned guard is dropped.
///
/// Scopes nest: dropping the guard restores whatever post was current before.
/// The context is per thread, so async callers holding a scope across `.await`
/// should run on a current-thread runtime.
pub fn post_scope(post_id: u64) -> PostScope {
    let previous = CURRENT_POST.with(|v| v.replace(Some(post_id)));
    PostScope { previous }
}

/// Guard returned by [`post_scope`].
#[must_use = "the post context is cleared as soon as the guard is dropped"]
pub struct PostScope {
    previous: Option<u64>,
}

impl Drop for PostScope {
    fn drop(&mut self) {
        CURRENT_POST.with(|v| v.set(self.previous));
    }
}

/// Logs at `$level`, prefixing the message with the current post when set.
#[doc(hidden)]
#[macro_export]
macro_rules! __harvest_log {
    ($level:expr, $($arg:tt)*) => {{
        match $crate::current_post() {
            Some(post) => log::log!($level, "[post {}] {}", post, format_args!($($arg)*)),
            None => log::log!($level, $($arg)*),
        }
    }};
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_trace {
    ($($arg:tt)*) => {
        $crate::__harvest_log!(log::Level::Trace, $($arg)*)
    };
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_debug {
    ($($arg:tt)*) => {
        $crate::__harvest_log!(log::Level::Debug, $($arg)*)
    };
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_info {
    ($($arg:tt)*) => {
        $crate::__harvest_log!(log::Level::Info, $($arg)*)
    };
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_warn {
    ($($arg:tt)*) => {
        $crate::__harvest_log!(log::Level::Warn, $($arg)*)
    };
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_error {
    ($($arg:tt)*) => {
        $crate::__harvest_log!(log::Level::Error, $($arg)*)
    };
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
