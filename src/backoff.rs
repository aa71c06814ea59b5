use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff: min, 2·min, 4·min … capped at max, plus optional jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    jitter: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self { min, max, jitter: Duration::ZERO, current: min }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait now; doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        if self.jitter.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(extra)
    }

    /// Call after a healthy run so the next failure starts from `min` again.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
