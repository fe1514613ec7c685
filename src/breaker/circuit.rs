use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{BreakerSettings, CircuitError, CircuitState};

const MAX_STATE_CHANGES: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub at: DateTime<Utc>,
    pub from: CircuitState,
    pub to: CircuitState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BreakerMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub timeouts: u64,
    /// Most recent transitions, oldest first
    pub state_changes: VecDeque<StateChange>,
}

/// Point-in-time view of a breaker, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub metrics: BreakerMetrics,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    metrics: BreakerMetrics,
}

enum Outcome {
    Success,
    Failure,
    Timeout,
    /// Error the classifier did not count
    Ignored,
}

pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                metrics: BreakerMetrics::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, without triggering the lazy Open to HalfOpen check.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call made now would be attempted.
    pub fn is_available(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => self.recovery_elapsed(&inner),
        }
    }

    pub fn metrics(&self) -> BreakerMetrics {
        self.lock().metrics.clone()
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            metrics: inner.metrics.clone(),
        }
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_time = None;
    }

    /// Run an async operation; every `Err` counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.guarded(op, |_| true, self.settings.timeout).await
    }

    /// Like [`CircuitBreaker::call`] with a per-call deadline. `None` falls
    /// back to the breaker's configured timeout.
    pub async fn call_with_timeout<F, Fut, T, E>(
        &self,
        op: F,
        timeout: Option<Duration>,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let timeout = timeout.unwrap_or(self.settings.timeout);
        self.guarded(op, |_| true, timeout).await
    }

    /// Run an async operation; only errors accepted by `is_failure` count
    /// against the breaker. Others are returned as `Inner` untouched.
    pub async fn call_with<F, Fut, T, E, C>(&self, op: F, is_failure: C) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        self.guarded(op, is_failure, self.settings.timeout).await
    }

    async fn guarded<F, Fut, T, E, C>(
        &self,
        op: F,
        is_failure: C,
        timeout: Duration,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        self.admit()?;

        match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => {
                self.record(Outcome::Success);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record(if is_failure(&e) {
                    Outcome::Failure
                } else {
                    Outcome::Ignored
                });
                Err(CircuitError::Inner(e))
            }
            Err(_) => {
                self.record(Outcome::Timeout);
                Err(CircuitError::Timeout(timeout))
            }
        }
    }

    /// Run a blocking operation on a worker thread; every `Err` counts.
    pub fn call_blocking<F, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.guarded_blocking(op, |_| true, self.settings.timeout)
    }

    /// Blocking variant of [`CircuitBreaker::call_with_timeout`].
    pub fn call_blocking_with_timeout<F, T, E>(
        &self,
        op: F,
        timeout: Option<Duration>,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let timeout = timeout.unwrap_or(self.settings.timeout);
        self.guarded_blocking(op, |_| true, timeout)
    }

    /// Blocking variant of [`CircuitBreaker::call_with`].
    ///
    /// On timeout the worker thread is left to finish on its own and its
    /// result is discarded.
    pub fn call_blocking_with<F, T, E, C>(&self, op: F, is_failure: C) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        C: Fn(&E) -> bool,
    {
        self.guarded_blocking(op, is_failure, self.settings.timeout)
    }

    fn guarded_blocking<F, T, E, C>(
        &self,
        op: F,
        is_failure: C,
        timeout: Duration,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        C: Fn(&E) -> bool,
    {
        self.admit()?;

        let (tx, rx) = mpsc::sync_channel(1);
        let worker = std::thread::spawn(move || {
            let _ = tx.send(op());
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => {
                self.record(Outcome::Success);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record(if is_failure(&e) {
                    Outcome::Failure
                } else {
                    Outcome::Ignored
                });
                Err(CircuitError::Inner(e))
            }
            Err(RecvTimeoutError::Timeout) => {
                self.record(Outcome::Timeout);
                Err(CircuitError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Sender dropped without sending: the operation panicked
                self.record(Outcome::Failure);
                match worker.join() {
                    Err(payload) => std::panic::resume_unwind(payload),
                    Ok(()) => unreachable!("worker exited without sending a result"),
                }
            }
        }
    }

    /// Count the request and decide whether it may proceed.
    fn admit<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.lock();
        inner.metrics.total_requests += 1;

        if inner.state == CircuitState::Open {
            if self.recovery_elapsed(&inner) {
                inner.success_count = 0;
                self.transition(&mut inner, CircuitState::HalfOpen);
            } else {
                inner.metrics.rejected_requests += 1;
                debug!(breaker = %self.name, "Rejected call: circuit open");
                return Err(CircuitError::Open(self.name.clone()));
            }
        }
        Ok(())
    }

    fn recovery_elapsed(&self, inner: &Inner) -> bool {
        inner
            .last_failure_time
            .is_none_or(|t| t.elapsed() >= self.settings.recovery_timeout)
    }

    fn record(&self, outcome: Outcome) {
        let mut inner = self.lock();
        match outcome {
            Outcome::Success => {
                inner.metrics.successful_requests += 1;
                match inner.state {
                    CircuitState::HalfOpen => {
                        inner.success_count += 1;
                        if inner.success_count >= self.settings.success_threshold {
                            inner.failure_count = 0;
                            inner.success_count = 0;
                            self.transition(&mut inner, CircuitState::Closed);
                        }
                    }
                    _ => inner.failure_count = 0,
                }
            }
            Outcome::Failure | Outcome::Timeout => {
                if matches!(outcome, Outcome::Timeout) {
                    inner.metrics.timeouts += 1;
                    debug!(breaker = %self.name, "Call timed out");
                } else {
                    debug!(breaker = %self.name, "Call failed");
                }
                inner.metrics.failed_requests += 1;
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());

                let trip = match inner.state {
                    CircuitState::HalfOpen => true,
                    CircuitState::Closed => inner.failure_count >= self.settings.failure_threshold,
                    CircuitState::Open => false,
                };
                if trip {
                    inner.success_count = 0;
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            Outcome::Ignored => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;

        if inner.metrics.state_changes.len() >= MAX_STATE_CHANGES {
            inner.metrics.state_changes.pop_front();
        }
        inner.metrics.state_changes.push_back(StateChange {
            at: Utc::now(),
            from,
            to,
        });

        if to == CircuitState::Open {
            warn!(breaker = %self.name, "Circuit opened after {} failure(s)", inner.failure_count);
        } else {
            info!(breaker = %self.name, "Circuit {} -> {}", from, to);
        }
    }
}
