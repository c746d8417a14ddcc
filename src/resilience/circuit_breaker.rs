//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and feed the rolling window
//! - Open: upstream assumed down, calls short-circuit without running
//! - Half-Open: a bounded number of trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure percentage in the window > threshold
//! Open → Half-Open: first call after the reset delay
//! Half-Open → Closed: trial call succeeds (window cleared)
//! Half-Open → Open: trial call fails or times out (reset delay restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream, owned by the upstream registry
//! - Window update and transition happen under one mutex, never held across `.await`
//! - Each transition bumps a generation; only calls admitted in the current
//!   generation may decide the next transition
//! - Application errors are returned untouched and never move the state

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::window::{Event, RollingWindow, WindowCounts};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "halfOpen",
        }
    }
}

/// Errors returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Breaker is open (or half-open with every trial slot taken).
    #[error("circuit breaker for {upstream} is open")]
    Open { upstream: String },

    /// Call exceeded the per-call timeout; its result was discarded.
    #[error("call to {upstream} timed out after {after:?}")]
    Timeout { upstream: String, after: Duration },

    /// Call completed with a fault.
    #[error("call failed: {0}")]
    Failed(E),
}

/// Classifies a successful completion for breaker accounting.
pub trait Accounted {
    /// True when the value is a domain-level negative outcome that must not
    /// affect breaker health.
    fn is_application_error(&self) -> bool;
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub stats: WindowCounts,
    pub failure_percentage: f64,
    pub half_open_trials: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    window: RollingWindow,
}

/// Per-upstream circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CircuitState>,
}

/// Admission to run one guarded operation.
///
/// Dropping an unsettled ticket (the guarded future was cancelled) releases a
/// half-open trial slot without deciding a transition.
struct Ticket<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl Ticket<'_> {
    fn settle(mut self, event: Event) {
        self.settled = true;
        self.breaker.settle(self.generation, self.trial, Some(event));
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.generation, self.trial, None);
        }
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        let window = RollingWindow::new(config.rolling_window(), config.rolling_buckets, Instant::now());
        let (state_tx, _) = watch::channel(CircuitState::Closed);

        tracing::debug!(
            upstream = %name,
            timeout_ms = config.call_timeout_ms,
            threshold = config.error_threshold_percentage,
            reset_ms = config.reset_timeout_ms,
            "Circuit breaker initialized"
        );
        metrics::set_breaker_state(&name, CircuitState::Closed);

        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                opened_at: None,
                trials_in_flight: 0,
                window,
            }),
            state_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. An open breaker whose reset delay elapsed still reports
    /// open until the next call tries it.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CircuitState> {
        self.state_tx.subscribe()
    }

    /// State plus rolling statistics.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        let stats = inner.window.totals(Instant::now());
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_percentage: stats.failure_percentage(),
            stats,
            half_open_trials: inner.trials_in_flight,
        }
    }

    /// Count a fallback served on behalf of this upstream.
    pub fn record_fallback(&self) {
        self.lock().window.record(Event::Fallback, Instant::now());
    }

    /// Run `operation` under breaker protection.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Accounted,
    {
        let ticket = self.admit().ok_or_else(|| BreakerError::Open {
            upstream: self.name.clone(),
        })?;

        let limit = self.config.call_timeout();
        match timeout(limit, operation()).await {
            Err(_) => {
                tracing::warn!(upstream = %self.name, timeout_ms = limit.as_millis() as u64, "Upstream call timed out");
                ticket.settle(Event::Timeout);
                Err(BreakerError::Timeout {
                    upstream: self.name.clone(),
                    after: limit,
                })
            }
            Ok(Err(e)) => {
                ticket.settle(Event::Failure);
                Err(BreakerError::Failed(e))
            }
            Ok(Ok(value)) => {
                if value.is_application_error() {
                    ticket.settle(Event::ApplicationError);
                } else {
                    ticket.settle(Event::Success);
                }
                Ok(value)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the counters half-written
        // in a way later calls can't tolerate, so keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self) -> Option<Ticket<'_>> {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Some(Ticket {
                breaker: self,
                generation: inner.generation,
                trial: false,
                settled: false,
            }),
            CircuitState::Open => {
                let ready = inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= self.config.reset_timeout())
                    .unwrap_or(true);
                if ready {
                    self.transition(&mut inner, CircuitState::HalfOpen, now);
                    inner.trials_in_flight = 1;
                    Some(Ticket {
                        breaker: self,
                        generation: inner.generation,
                        trial: true,
                        settled: false,
                    })
                } else {
                    inner.window.record(Event::Reject, now);
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight < self.config.half_open_max_calls {
                    inner.trials_in_flight += 1;
                    Some(Ticket {
                        breaker: self,
                        generation: inner.generation,
                        trial: true,
                        settled: false,
                    })
                } else {
                    inner.window.record(Event::Reject, now);
                    None
                }
            }
        }
    }

    /// Account one completion. `None` means the call was abandoned.
    fn settle(&self, generation: u64, trial: bool, event: Option<Event>) {
        let now = Instant::now();
        let mut inner = self.lock();

        if let Some(event) = event {
            inner.window.record(event, now);
        }

        if generation != inner.generation {
            tracing::debug!(upstream = %self.name, "Completion from an earlier breaker state ignored for transitions");
            return;
        }

        match (inner.state, event) {
            (CircuitState::Closed, Some(Event::Failure | Event::Timeout)) => {
                let totals = inner.window.totals(now);
                if totals.counted() >= self.config.volume_threshold
                    && totals.failure_percentage() > self.config.error_threshold_percentage
                {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, Some(Event::Success)) if trial => {
                self.transition(&mut inner, CircuitState::Closed, now);
            }
            (CircuitState::HalfOpen, Some(Event::Failure | Event::Timeout)) if trial => {
                self.transition(&mut inner, CircuitState::Open, now);
            }
            (CircuitState::HalfOpen, _) if trial => {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.trials_in_flight = 0;

        match to {
            CircuitState::Open => {
                inner.opened_at = Some(now);
                let stats = inner.window.totals(now);
                tracing::warn!(
                    upstream = %self.name,
                    from = from.as_str(),
                    failures = stats.failures,
                    timeouts = stats.timeouts,
                    failure_percentage = stats.failure_percentage(),
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                tracing::info!(upstream = %self.name, "Circuit breaker half-open");
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.window.clear(now);
                tracing::info!(upstream = %self.name, "Circuit breaker closed");
            }
        }

        self.state_tx.send_replace(to);
        metrics::record_breaker_transition(&self.name, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::sleep;

    #[derive(Debug)]
    enum Reply {
        Ok,
        NotFound,
    }

    impl Accounted for Reply {
        fn is_application_error(&self) -> bool {
            matches!(self, Reply::NotFound)
        }
    }

    fn config(reset_ms: u64) -> BreakerConfig {
        BreakerConfig {
            call_timeout_ms: 100,
            reset_timeout_ms: reset_ms,
            ..BreakerConfig::default()
        }
    }

    async fn fail(cb: &CircuitBreaker) -> Result<Reply, BreakerError<&'static str>> {
        cb.call(|| async { Err::<Reply, _>("connection refused") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<Reply, BreakerError<&'static str>> {
        cb.call(|| async { Ok::<_, &'static str>(Reply::Ok) }).await
    }

    #[tokio::test]
    async fn test_opens_when_failure_percentage_exceeds_threshold() {
        let cb = CircuitBreaker::new("users", config(10_000));

        assert!(succeed(&cb).await.is_ok());
        // 1 of 2 = 50%, not above the threshold
        assert!(matches!(fail(&cb).await, Err(BreakerError::Failed(_))));
        assert_eq!(cb.state(), CircuitState::Closed);

        // 2 of 3 = 66%
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let result = cb
            .call(|| async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, &'static str>(Reply::Ok)
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst), "open breaker must not run the operation");
        assert_eq!(cb.snapshot().stats.rejects, 1);
    }

    #[tokio::test]
    async fn test_volume_threshold_delays_tripping() {
        let cb = CircuitBreaker::new(
            "orders",
            BreakerConfig {
                volume_threshold: 3,
                ..config(10_000)
            },
        );

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure_and_discards_result() {
        let cb = CircuitBreaker::new("reviews", config(10_000));

        let result = cb
            .call(|| async {
                sleep(Duration::from_millis(300)).await;
                Ok::<_, &'static str>(Reply::Ok)
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Timeout { .. })));
        assert_eq!(cb.state(), CircuitState::Open);
        let stats = cb.snapshot().stats;
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.successes, 0);
    }

    #[tokio::test]
    async fn test_half_open_success_closes_and_clears_history() {
        let cb = CircuitBreaker::new("users", config(50));
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        sleep(Duration::from_millis(80)).await;
        assert!(succeed(&cb).await.is_ok());

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.stats, WindowCounts::default());
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_and_restarts_delay() {
        let cb = CircuitBreaker::new("users", config(50));
        let _ = fail(&cb).await;

        sleep(Duration::from_millis(80)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        // The delay restarted with the failed trial.
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open { .. })));

        sleep(Duration::from_millis(80)).await;
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_admits_bounded_trials() {
        let cb = Arc::new(CircuitBreaker::new("users", config(20)));
        let _ = fail(&cb).await;
        sleep(Duration::from_millis(40)).await;

        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async {
                    sleep(Duration::from_millis(50)).await;
                    Ok::<_, &'static str>(Reply::Ok)
                })
                .await
                .is_ok()
            })
        };
        sleep(Duration::from_millis(10)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // The single trial slot is taken.
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open { .. })));

        assert!(slow.await.unwrap());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_application_errors_never_change_state() {
        let cb = CircuitBreaker::new("users", config(10_000));

        for _ in 0..50 {
            let result = cb.call(|| async { Ok::<_, &'static str>(Reply::NotFound) }).await;
            assert!(matches!(result, Ok(Reply::NotFound)));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().stats.application_errors, 50);
        assert_eq!(cb.snapshot().failure_percentage, 0.0);
    }

    #[tokio::test]
    async fn test_application_error_trial_releases_slot() {
        let cb = CircuitBreaker::new("users", config(20));
        let _ = fail(&cb).await;
        sleep(Duration::from_millis(40)).await;

        let result = cb.call(|| async { Ok::<_, &'static str>(Reply::NotFound) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().half_open_trials, 0);

        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stale_completion_does_not_decide_transition() {
        let cb = Arc::new(CircuitBreaker::new("orders", config(10_000)));

        // Admitted while closed, completes after the breaker has opened.
        let straggler = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async {
                    sleep(Duration::from_millis(50)).await;
                    Ok::<_, &'static str>(Reply::Ok)
                })
                .await
            })
        };
        sleep(Duration::from_millis(5)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(straggler.await.unwrap().is_ok());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_transitions_are_observable() {
        let cb = CircuitBreaker::new("users", config(10_000));
        let mut rx = cb.subscribe();

        let _ = fail(&cb).await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), CircuitState::Open);
    }
}
