// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with multiplicative jitter.
//!
//! Used by the auth retry loop and the WebSocket reconnect loop. The
//! deterministic part doubles from `base` per attempt; jitter multiplies
//! the delay by a factor in `[1, 1 + jitter]`; the result is capped at
//! `max`. Jitter spreads a fleet of devices recovering from the same
//! outage so they do not reconnect in lockstep.

use std::time::Duration;

use rand::Rng;

/// A reusable backoff schedule.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    base: Duration,
    max: Duration,
    /// Multiplicative jitter fraction in `[0, 1]`.
    jitter: f64,
}

impl BackoffSchedule {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `attempt` (0-based: the delay after the
    /// first failure is `delay(0)`).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(31)))
            .min(self.max);
        let factor = 1.0 + rand::thread_rng().gen_range(0.0..=1.0) * self.jitter;
        let jittered = exp.mul_f64(factor);
        jittered.min(self.max)
    }

    /// The deterministic (jitter-free) delay, exposed for tests.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(attempt.min(31)))
            .min(self.max)
    }
}
