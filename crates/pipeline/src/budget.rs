//! Time budget controller for the batch loop.
//!
//! The budget is cooperative: it is checked once per candidate before new
//! work starts and never interrupts an in-flight encode. Remaining
//! candidates are simply left for a future run.

use std::time::{Duration, Instant};

/// Elapsed-time budget for one batch run.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    started: Instant,
    limit: Option<Duration>,
}

impl TimeBudget {
    /// Creates a budget of the given number of hours; 0 (or negative)
    /// means unlimited.
    pub fn new(hours: f64) -> Self {
        let limit = if hours > 0.0 {
            Some(Duration::from_secs_f64(hours * 3600.0))
        } else {
            None
        };
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// True once the elapsed time has passed the limit.
    pub fn exhausted(&self) -> bool {
        match self.limit {
            Some(limit) => self.started.elapsed() >= limit,
            None => false,
        }
    }

    /// Elapsed time since the batch started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
