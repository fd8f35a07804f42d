// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Capped exponential backoff with jitter.
//!
//! Used by the connection pool reconnect loop (1 s doubling to 30 s, ±25%
//! jitter) and by the AAS client for transient HTTP retries.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// =============================================================================
// BackoffPolicy
// =============================================================================

/// Exponential backoff schedule: `initial * multiplier^attempt`, capped at
/// `max`, randomized by `± jitter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial: Duration,

    /// Upper bound on the delay.
    pub max: Duration,

    /// Growth factor per attempt.
    pub multiplier: f64,

    /// Jitter fraction in `[0, 1]`; the delay is scaled by a uniform factor
    /// in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl BackoffPolicy {
    /// The reconnect schedule: 1 s doubling to a 30 s cap, ±25% jitter.
    pub fn reconnect() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }

    /// A short schedule for transient HTTP retries.
    pub fn transient_http() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }

    /// Returns the jittered delay for the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial.as_secs_f64() * self.multiplier.powi(attempt.min(63) as i32);
        let capped = base.min(self.max.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Returns the delay without jitter, for deterministic assertions.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base = self.initial.as_secs_f64() * self.multiplier.powi(attempt.min(63) as i32);
        Duration::from_secs_f64(base.min(self.max.as_secs_f64()))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::reconnect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_doubles_to_cap() {
        let policy = BackoffPolicy::reconnect();
        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(2), Duration::from_secs(4));
        assert_eq!(policy.base_delay(4), Duration::from_secs(16));
        assert_eq!(policy.base_delay(5), Duration::from_secs(30));
        assert_eq!(policy.base_delay(20), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = BackoffPolicy::reconnect();
        for attempt in 0..6 {
            let base = policy.base_delay(attempt).as_secs_f64();
            for _ in 0..50 {
                let jittered = policy.delay(attempt).as_secs_f64();
                assert!(jittered >= base * 0.75 - 1e-9, "attempt {}", attempt);
                assert!(jittered <= base * 1.25 + 1e-9, "attempt {}", attempt);
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy {
            jitter: 0.0,
            ..BackoffPolicy::reconnect()
        };
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }
}
