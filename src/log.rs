//! Opaque log handle threaded through pool operations.
//!
//! The pool never picks a logging backend; it only ever emits through the
//! [`log`] facade, tagged with whatever target the embedder chose when it
//! created the handle. A `Log` is `Copy` and cheap to pass by value into
//! every allocating call.

/// A handle identifying where a pool's diagnostics should be attributed.
///
/// This crate does not install a logger or decide verbosity; it only
/// calls into the [`log`] crate's macros under this handle's target.
/// Wiring a subscriber (`env_logger`, `tracing-log`, ...) is the
/// embedder's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Log {
    target: &'static str,
}

impl Log {
    /// Creates a handle that attributes diagnostics to `target`.
    pub const fn new(target: &'static str) -> Self {
        Self { target }
    }

    /// The target most pools should use unless they have a more specific
    /// identity (e.g. a connection or request id) to log under.
    pub const fn default_target() -> Self {
        Self::new("pool_arena::pool")
    }

    pub(crate) fn target(&self) -> &'static str {
        self.target
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::default_target()
    }
}

/// Emits a `warn`-level diagnostic attributed to a [`Log`] handle.
macro_rules! pool_warn {
    ($log:expr, $($arg:tt)+) => {
        ::log::warn!(target: $log.target(), $($arg)+)
    };
}

/// Emits a `debug`-level diagnostic attributed to a [`Log`] handle.
macro_rules! pool_debug {
    ($log:expr, $($arg:tt)+) => {
        ::log::debug!(target: $log.target(), $($arg)+)
    };
}

/// Emits an `error`-level diagnostic attributed to a [`Log`] handle.
macro_rules! pool_error {
    ($log:expr, $($arg:tt)+) => {
        ::log::error!(target: $log.target(), $($arg)+)
    };
}

pub(crate) use pool_debug;
pub(crate) use pool_error;
pub(crate) use pool_warn;
