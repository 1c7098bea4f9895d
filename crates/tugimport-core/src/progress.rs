//! Throttled progress reporting for long index operations.

use std::time::{Duration, Instant};

/// Minimum spacing between two progress callbacks.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(300);

/// Counts work items and forwards the running count to a callback at most
/// once per interval. [`ProgressThrottle::finish`] always reports the final
/// count so callers can compute completion exactly.
pub struct ProgressThrottle<'a> {
    callback: Option<&'a mut dyn FnMut(usize)>,
    interval: Duration,
    last_report: Option<Instant>,
    count: usize,
}

impl<'a> ProgressThrottle<'a> {
    pub fn new(callback: Option<&'a mut dyn FnMut(usize)>) -> Self {
        Self::with_interval(callback, PROGRESS_INTERVAL)
    }

    pub fn with_interval(callback: Option<&'a mut dyn FnMut(usize)>, interval: Duration) -> Self {
        ProgressThrottle {
            callback,
            interval,
            last_report: None,
            count: 0,
        }
    }

    /// Record one more item.
    pub fn tick(&mut self) {
        self.count += 1;
        let now = Instant::now();
        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_report = Some(now);
            if let Some(cb) = self.callback.as_mut() {
                cb(self.count);
            }
        }
    }

    /// Items counted so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Report the final count unconditionally and return it.
    pub fn finish(mut self) -> usize {
        if let Some(cb) = self.callback.as_mut() {
            cb(self.count);
        }
        self.count
    }
}
