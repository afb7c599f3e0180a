// ── Failure/backoff state machine ──
//
// One `BackoffState` per poller. Consecutive failures walk
// Healthy -> Degraded(1) -> Degraded(2) -> Exhausted; any success jumps
// straight back to Healthy. Exhausted only ends the current cycle: the
// next cycle re-arms the machine and a persisting fault starts again
// at Degraded(1). Auth failures never enter the machine.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::ErrorClass;

/// Retry timing for one poller.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Growth factor per further failure (1.0 = constant).
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Attempts per cycle, the first one included.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Cloud path: 2 s, 4 s, then give up for this cycle.
    pub fn cloud() -> Self {
        Self {
            initial: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }

    /// Local path: 1.5 s, 3 s, then give up for this cycle.
    pub fn local() -> Self {
        Self {
            initial: Duration::from_millis(1500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        }
    }

    /// Delay to wait after the `failures`-th consecutive failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = (self.initial.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Poller health as seen by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "failures", rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded(u32),
    Exhausted,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded(n) => write!(f, "degraded({n})"),
            Self::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// What the poller should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    RetryAfter(Duration),
    GiveUp,
}

/// Per-poller backoff state.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: BackoffPolicy,
    failures: u32,
    health: Health,
    next_allowed: Option<Instant>,
    last_error: Option<ErrorClass>,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            health: Health::Healthy,
            next_allowed: None,
            last_error: None,
        }
    }

    pub fn health(&self) -> Health {
        self.health
    }

    /// Consecutive failures in the current run of attempts.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_error(&self) -> Option<ErrorClass> {
        self.last_error
    }

    pub fn next_allowed(&self) -> Option<Instant> {
        self.next_allowed
    }

    pub fn is_exhausted(&self) -> bool {
        self.health == Health::Exhausted
    }

    /// Start a fresh run of attempts. The health label is kept until the
    /// next outcome so diagnostics still show how the last run ended.
    pub fn rearm(&mut self) {
        self.failures = 0;
        self.next_allowed = None;
    }

    /// Record a failed attempt and decide whether to try again.
    ///
    /// `retry_hint` is the server's own retry delay; a hint longer than
    /// the policy's maximum delay ends the cycle immediately.
    pub fn record_failure(&mut self, class: ErrorClass, retry_hint: Option<Duration>) -> Verdict {
        debug_assert_ne!(class, ErrorClass::Auth, "auth failures bypass backoff");

        self.failures = self.failures.saturating_add(1);
        self.last_error = Some(class);

        let hint_too_long = retry_hint.is_some_and(|h| h > self.policy.max_delay);
        if self.failures >= self.policy.max_attempts || hint_too_long {
            self.health = Health::Exhausted;
            self.next_allowed = None;
            return Verdict::GiveUp;
        }

        self.health = Health::Degraded(self.failures);
        let delay = self
            .policy
            .delay_for(self.failures)
            .max(retry_hint.unwrap_or_default());
        self.next_allowed = Some(Instant::now() + delay);
        Verdict::RetryAfter(delay)
    }

    /// Any success returns straight to Healthy.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.health = Health::Healthy;
        self.next_allowed = None;
    }

    /// Record when the poller will next try after giving up.
    pub fn defer_until(&mut self, at: Instant) {
        self.next_allowed = Some(at);
    }

    pub fn snapshot(&self) -> BackoffSnapshot {
        let now = Instant::now();
        BackoffSnapshot {
            health: self.health,
            failures: self.failures,
            last_error: self.last_error,
            retry_in: self
                .next_allowed
                .map(|at| at.saturating_duration_since(now)),
        }
    }
}

/// Point-in-time view of a `BackoffState`, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackoffSnapshot {
    pub health: Health,
    pub failures: u32,
    pub last_error: Option<ErrorClass>,
    #[serde(with = "duration_secs_opt")]
    pub retry_in: Option<Duration>,
}

impl Default for BackoffSnapshot {
    fn default() -> Self {
        Self {
            health: Health::Healthy,
            failures: 0,
            last_error: None,
            retry_in: None,
        }
    }
}

mod duration_secs_opt {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }
}
