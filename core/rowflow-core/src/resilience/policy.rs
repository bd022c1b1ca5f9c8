//! Retry policy

use crate::error::{FlowError, FlowResult};
use std::time::Duration;

/// Attempts and pause between them; fixed once attached to a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try, so `1` means no retry.
    pub fn new(max_attempts: u32, delay: Duration) -> FlowResult<Self> {
        if max_attempts == 0 {
            return Err(FlowError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    /// Policy without a pause between attempts.
    pub fn immediate(max_attempts: u32) -> FlowResult<Self> {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    /// Three retries after the initial attempt, two seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_secs(2),
        }
    }
}
