use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::warn;

use crate::error::CoreResult;

/// Bounded exponential backoff for calls that fail with a transient store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 25,
            max_delay_ms: 400,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    pub fn run<T>(&self, op: &str, mut f: impl FnMut() -> CoreResult<T>) -> CoreResult<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f() {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
