//! Per-thread verbosity ceiling for library messages.
//!
//! Library code logs through [`warn!`](crate::warn), [`info!`](crate::info)
//! and [`debug!`](crate::debug), which forward to the `log` facade only when
//! the level passes the ceiling installed with [`scoped`]. The ceiling
//! defaults to [`LevelFilter::Trace`], so outside a scope every message
//! reaches whatever logger the host installed.
//!
//! ```
//! use log::LevelFilter;
//! use vitzarr_core::verbosity;
//!
//! {
//!     let _guard = verbosity::scoped(LevelFilter::Off);
//!     assert!(!verbosity::enabled(log::Level::Warn));
//! }
//! assert!(verbosity::enabled(log::Level::Warn));
//! ```

use std::cell::Cell;

use log::{Level, LevelFilter};

#[doc(hidden)]
pub use log as __log;

thread_local! {
    static CEILING: Cell<LevelFilter> = const { Cell::new(LevelFilter::Trace) };
}

/// Restores the previous ceiling when dropped.
#[must_use = "the ceiling is reset as soon as the guard is dropped"]
#[derive(Debug)]
pub struct VerbosityGuard {
    previous: LevelFilter,
}

impl Drop for VerbosityGuard {
    fn drop(&mut self) {
        CEILING.with(|c| c.set(self.previous));
    }
}

/// Limit messages on this thread to `filter` until the guard is dropped.
pub fn scoped(filter: LevelFilter) -> VerbosityGuard {
    let previous = CEILING.with(|c| c.replace(filter));
    VerbosityGuard { previous }
}

/// The ceiling in effect on this thread.
pub fn ceiling() -> LevelFilter {
    CEILING.with(Cell::get)
}

pub fn enabled(level: Level) -> bool {
    level <= ceiling()
}

/// Log at `level` if it passes the current [`ceiling`].
#[macro_export]
macro_rules! emit {
    ($lvl:expr, $($arg:tt)+) => {{
        let lvl = $lvl;
        if $crate::verbosity::enabled(lvl) {
            $crate::verbosity::__log::log!(lvl, $($arg)+);
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => { $crate::emit!($crate::verbosity::__log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => { $crate::emit!($crate::verbosity::__log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::emit!($crate::verbosity::__log::Level::Debug, $($arg)+) };
}
