//! Tracing for hot loops that is compiled away unless the
//! `sketch_debug-trace` feature is enabled.

/// Prints trace information only when the `sketch_debug-trace` feature is
/// enabled, in which case it delegates to [`log::trace`].
///
/// # Examples
///
/// ```
/// use sketch_utilities::debug_trace;
///
/// let state = 3;
/// debug_trace!("Classified state {state} as blocking");
/// ```
#[macro_export]
#[cfg(feature = "sketch_debug-trace")]
macro_rules! debug_trace {
    ($($arg:tt)*) => {
        {
            log::trace!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "sketch_debug-trace"))]
macro_rules! debug_trace {
    ($($arg:tt)*) => {{
        // No-op when sketch_debug-trace is not enabled
    }};
}
