//! Prints progress information for long running loops, such as reading large
//! files, without flooding the log.

use std::cell::Cell;
use std::time::Duration;
use std::time::Instant;

/// A progress tracker that invokes its message at most once per interval.
pub struct TimeProgress<T> {
    interval: Duration,
    last_update: Cell<Instant>,
    message: Box<dyn Fn(T)>,
}

impl<T> TimeProgress<T> {
    /// Creates a new progress tracker printing at most every `interval_seconds`.
    pub fn new(message: impl Fn(T) + 'static, interval_seconds: u64) -> TimeProgress<T> {
        TimeProgress {
            message: Box::new(message),
            interval: Duration::from_secs(interval_seconds),
            last_update: Cell::new(Instant::now()),
        }
    }

    /// Reports the given progress when the interval has passed since the last report.
    pub fn print(&self, object: T) {
        let now = Instant::now();
        if now.duration_since(self.last_update.get()) >= self.interval {
            (self.message)(object);
            self.last_update.set(now);
        }
    }
}
