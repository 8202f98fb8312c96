// src/utils/backoff.rs
use rand::Rng;
use std::time::Duration;

const MAX_EXPONENT: u32 = 16;

/// Reconnect delay: `base * 2^attempt` capped at `max`, less up to 25% jitter.
/// Delays stay spread out once the cap is reached.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(MAX_EXPONENT);
        self.attempt = self.attempt.saturating_add(1);

        let scaled = self.base.saturating_mul(1_u32 << exponent).min(self.max);
        let jitter_cap = scaled.as_millis() as u64 / 4;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        scaled.saturating_sub(Duration::from_millis(jitter))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
