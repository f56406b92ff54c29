//! Timer utilities
//!
//! Measures waits on shared documents and the teardown of a run.

use std::time::{Duration, Instant};

/// Simple timer for measuring elapsed time
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
    slow_after: Option<Duration>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
            slow_after: None,
        }
    }

    /// Report at warn level when stopped after `threshold`
    pub fn slow_after(mut self, threshold: Duration) -> Self {
        self.slow_after = Some(threshold);
        self
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Stop timer and return elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        match self.slow_after {
            Some(threshold) if elapsed >= threshold => {
                tracing::warn!("{} took {}ms", self.label, elapsed.as_millis())
            }
            _ => tracing::debug!("{}: {}ms", self.label, elapsed.as_millis()),
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timer() {
        let timer = Timer::start("test");
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10);
        assert!(timer.stop() >= Duration::from_millis(10));
    }

    #[test]
    fn test_slow_timer_still_returns_elapsed() {
        let timer = Timer::start("slow").slow_after(Duration::ZERO);
        assert!(timer.stop() >= Duration::ZERO);
    }
}
