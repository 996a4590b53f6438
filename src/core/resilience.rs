//! Retry wrapper for provider operations.
//!
//! [`RetryExecutor::execute`] runs an async operation and retries it with
//! exponential backoff and jitter while [`classify`] says the failure is
//! transient. Auth and "no team" failures are never retried; unknown errors
//! fail closed.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::error::{Result, SpendError};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound for a server supplied retry-after hint.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Number of recent calls the health window keeps.
pub const HEALTH_WINDOW: usize = 20;

// =============================================================================
// Policy
// =============================================================================

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay used as a uniform ± jitter band.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry `attempt` (0-based).
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else if capped.is_finite() {
            Duration::ZERO
        } else {
            self.max_delay
        }
    }

    /// Jittered delay before retry `attempt`, within `[0, max_delay]`.
    pub fn delay_with_jitter<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let band = base * self.jitter_fraction.abs();
        let offset = if band > 0.0 {
            rng.gen_range(-band..=band)
        } else {
            0.0
        };
        let jittered = (base + offset).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }
}

// =============================================================================
// Classification
// =============================================================================

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry; a server hint replaces the computed backoff when present.
    Retry { delay_override: Option<Duration> },
    /// Return the error to the caller.
    GiveUp,
}

impl RetryDecision {
    #[must_use]
    pub const fn should_retry(self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Decide whether an error is worth another attempt.
#[must_use]
pub fn classify(err: &SpendError) -> RetryDecision {
    match err {
        SpendError::Unauthorized { .. } | SpendError::NoTeamFound { .. } => RetryDecision::GiveUp,
        SpendError::RateLimited { retry_after, .. } => RetryDecision::Retry {
            delay_override: retry_after.map(|hint| hint.min(MAX_RETRY_AFTER)),
        },
        _ if err.status_code().is_some_and(|code| (400..500).contains(&code)) => {
            RetryDecision::GiveUp
        }
        SpendError::Decoding {
            status_code: Some(204),
            ..
        } => RetryDecision::GiveUp,
        SpendError::ServiceUnavailable { .. } | SpendError::ServerError { .. } => {
            RetryDecision::Retry {
                delay_override: None,
            }
        }
        SpendError::Transport { kind, .. } if kind.is_transient() => RetryDecision::Retry {
            delay_override: None,
        },
        _ => RetryDecision::GiveUp,
    }
}

// =============================================================================
// Health
// =============================================================================

/// Coarse health derived from the recent call window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Failing,
}

/// Read-only health report for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceHealth {
    pub state: HealthState,
    /// Successes / calls over the recent window; 1.0 with no calls.
    pub success_rate: f64,
    pub recent_calls: usize,
    pub consecutive_failures: u32,
    pub total_retries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct HealthWindow {
    outcomes: VecDeque<bool>,
    consecutive_failures: u32,
    total_retries: u64,
    last_failure_at: Option<DateTime<Utc>>,
}

impl HealthWindow {
    fn record(&mut self, success: bool) {
        if self.outcomes.len() == HEALTH_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.last_failure_at = Some(Utc::now());
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn report(&self) -> ResilienceHealth {
        let calls = self.outcomes.len();
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        let success_rate = if calls == 0 {
            1.0
        } else {
            successes as f64 / calls as f64
        };
        let state = if self.consecutive_failures >= 3 || success_rate < 0.5 {
            HealthState::Failing
        } else if self.consecutive_failures > 0 || success_rate < 0.9 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        ResilienceHealth {
            state,
            success_rate,
            recent_calls: calls,
            consecutive_failures: self.consecutive_failures,
            total_retries: self.total_retries,
            last_failure_at: self.last_failure_at,
        }
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Runs operations under a [`RetryPolicy`] and tracks their health.
#[derive(Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    health: Mutex<HealthWindow>,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            health: Mutex::new(HealthWindow::default()),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out.
    ///
    /// # Errors
    ///
    /// Returns the last error unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(operation, attempts = attempt + 1, "Succeeded after retry");
                    }
                    self.with_health(|h| h.record(true));
                    return Ok(value);
                }
                Err(err) => {
                    let decision = classify(&err);
                    if !decision.should_retry() || attempt >= self.policy.max_retries {
                        tracing::debug!(
                            operation,
                            attempts = attempt + 1,
                            error = %err,
                            retryable = decision.should_retry(),
                            "Giving up"
                        );
                        // A missing team is an answer, not a failure.
                        let healthy = matches!(err, SpendError::NoTeamFound { .. });
                        self.with_health(|h| h.record(healthy));
                        return Err(err);
                    }

                    let delay = match decision {
                        RetryDecision::Retry {
                            delay_override: Some(hint),
                        } => hint,
                        _ => self
                            .policy
                            .delay_with_jitter(attempt, &mut rand::thread_rng()),
                    };

                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_retries + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient failure, retrying"
                    );
                    self.with_health(|h| h.total_retries += 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Health over the recent call window.
    #[must_use]
    pub fn health(&self) -> ResilienceHealth {
        self.with_health(|h| h.report())
    }

    fn with_health<R>(&self, f: impl FnOnce(&mut HealthWindow) -> R) -> R {
        let mut guard = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::Provider;
    use crate::error::TransportKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    const P: Provider = Provider::Cursor;

    fn transient() -> SpendError {
        SpendError::Transport {
            provider: P,
            kind: TransportKind::ConnectionLost,
            message: "connection reset by peer".to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Classification
    // -------------------------------------------------------------------------

    #[test]
    fn auth_and_missing_team_never_retry() {
        assert_eq!(
            classify(&SpendError::Unauthorized { provider: P }),
            RetryDecision::GiveUp
        );
        assert_eq!(
            classify(&SpendError::NoTeamFound { provider: P }),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn client_errors_do_not_retry() {
        let err = SpendError::Network {
            provider: P,
            message: "Forbidden".to_string(),
            status_code: Some(403),
        };
        assert_eq!(classify(&err), RetryDecision::GiveUp);

        let err = SpendError::Decoding {
            provider: P,
            message: "bad".to_string(),
            status_code: Some(422),
        };
        assert_eq!(classify(&err), RetryDecision::GiveUp);
    }

    #[test]
    fn no_content_decoding_error_does_not_retry() {
        let err = SpendError::Decoding {
            provider: P,
            message: "empty".to_string(),
            status_code: Some(204),
        };
        assert_eq!(classify(&err), RetryDecision::GiveUp);
    }

    #[test]
    fn rate_limit_retries_with_capped_hint() {
        let err = SpendError::RateLimited {
            provider: P,
            retry_after: Some(Duration::from_secs(120)),
            message: String::new(),
        };
        assert_eq!(
            classify(&err),
            RetryDecision::Retry {
                delay_override: Some(MAX_RETRY_AFTER)
            }
        );

        let err = SpendError::RateLimited {
            provider: P,
            retry_after: None,
            message: String::new(),
        };
        assert_eq!(
            classify(&err),
            RetryDecision::Retry {
                delay_override: None
            }
        );
    }

    #[test]
    fn server_side_failures_retry() {
        assert!(
            classify(&SpendError::ServiceUnavailable {
                provider: P,
                message: String::new(),
            })
            .should_retry()
        );
        assert!(
            classify(&SpendError::ServerError {
                provider: P,
                status_code: 502,
                message: String::new(),
            })
            .should_retry()
        );
    }

    #[test]
    fn transport_kinds_follow_transience() {
        assert!(classify(&transient()).should_retry());
        let tls = SpendError::Transport {
            provider: P,
            kind: TransportKind::Tls,
            message: "bad certificate".to_string(),
        };
        assert!(!classify(&tls).should_retry());
    }

    #[test]
    fn unknown_errors_fail_closed() {
        let err = SpendError::Network {
            provider: P,
            message: "weird".to_string(),
            status_code: None,
        };
        assert!(!classify(&err).should_retry());
        assert!(!classify(&SpendError::Config("x".to_string())).should_retry());
        let decoding = SpendError::Decoding {
            provider: P,
            message: "missing field".to_string(),
            status_code: Some(200),
        };
        assert!(!classify(&decoding).should_retry());
    }

    // -------------------------------------------------------------------------
    // Backoff
    // -------------------------------------------------------------------------

    #[test]
    fn base_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(2), Duration::from_secs(4));
        assert_eq!(policy.base_delay(10), Duration::from_secs(30));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jittered_delay_stays_in_band() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let delay = policy.delay_with_jitter(2, &mut rng).as_secs_f64();
            assert!((3.6..=4.4).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn jittered_delay_never_exceeds_max() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(11);
        for attempt in 0..64 {
            let delay = policy.delay_with_jitter(attempt, &mut rng);
            assert!(delay <= policy.max_delay);
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy {
            jitter_fraction: 0.0,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.delay_with_jitter(1, &mut rng), Duration::from_secs(2));
    }

    // -------------------------------------------------------------------------
    // Executor
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn two_transient_failures_then_success() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("fetch_invoice", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(transient()) } else { Ok(4000) }
            })
            .await;

        assert_eq!(result.unwrap(), 4000);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(executor.health().total_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_attempted_once() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute("fetch_user", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SpendError::Unauthorized { provider: P })
            })
            .await;

        assert!(matches!(result, Err(SpendError::Unauthorized { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error_unchanged() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute("fetch_usage", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(SpendError::ServerError {
                    provider: P,
                    status_code: 500 + u16::try_from(n).unwrap(),
                    message: String::new(),
                })
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            result,
            Err(SpendError::ServerError {
                status_code: 503,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_backoff() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = executor
            .execute("fetch_invoice", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SpendError::RateLimited {
                        provider: P,
                        retry_after: Some(Duration::from_secs(7)),
                        message: String::new(),
                    })
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn retries_are_logged() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);

        let _ = executor
            .execute("fetch_team", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(transient())
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(logs_contain("Transient failure, retrying"));
    }

    #[tokio::test]
    async fn health_reflects_recent_outcomes() {
        let executor = RetryExecutor::new(RetryPolicy::no_retry());
        assert_eq!(executor.health().state, HealthState::Healthy);
        assert!((executor.health().success_rate - 1.0).abs() < f64::EPSILON);

        for _ in 0..3 {
            let _: Result<()> = executor
                .execute("op", || async { Err(SpendError::Unauthorized { provider: P }) })
                .await;
        }
        let health = executor.health();
        assert_eq!(health.state, HealthState::Failing);
        assert_eq!(health.consecutive_failures, 3);
        assert!(health.last_failure_at.is_some());

        let _ = executor.execute("op", || async { Ok(()) }).await;
        let health = executor.health();
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.recent_calls, 4);
        assert!((health.success_rate - 0.25).abs() < f64::EPSILON);
    }
}
