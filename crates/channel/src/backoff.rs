#![forbid(unsafe_code)]

use std::time::Duration;

/// Reconnect delays: start at `base`, double per failure, never exceed `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        let max = policy.max.max(policy.base);
        Self {
            base: policy.base,
            max,
            current: policy.base,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.checked_mul(2).unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }

    /// Settle the delay after a connection ends. Only a session that stayed
    /// up for `STABLE_SESSION` or moved at least one frame counts as a
    /// recovery; a peer that accepts and drops keeps the delay growing.
    pub(crate) fn session_ended(&mut self, uptime: Duration, progressed: bool) {
        if progressed || uptime >= STABLE_SESSION {
            self.reset();
        }
    }
}

pub(crate) const STABLE_SESSION: Duration = Duration::from_secs(10);
