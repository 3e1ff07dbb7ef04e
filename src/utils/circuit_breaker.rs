use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::metrics::Metrics;
use crate::utils::IsTransient;

// ============================================================================
// Circuit Breaker Pattern Implementation
// ============================================================================
//
// Stops calling a dependency that keeps failing and lets callers fall back
// to a degraded answer for a cool-down period.
//
// States:
// - Closed: Normal operation, requests pass through
// - Open: Too many failures in the rolling window, requests blocked immediately
// - HalfOpen: Cool-down elapsed, a single probe request is let through
//
// Only transient errors count as failures. A permanent error (NotFound,
// InvalidPayload) proves the dependency answered and is recorded as a success.
//
// All transitions happen under one mutex so concurrent callers never lose an
// update. The lock is never held across an await.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
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
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding: 0=Closed, 1=Open, 2=HalfOpen
    pub fn gauge_value(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before opening the circuit
    pub failure_threshold: u32,
    /// Failures further apart than this start a fresh count
    pub rolling_window: Duration,
    /// Time to stay open before letting a probe through
    pub open_duration: Duration,
    /// Successful probes needed to close from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            rolling_window: Duration::from_secs(30),
            open_duration: Duration::from_secs(10),
            success_threshold: 1,
        }
    }
}

struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    window_started: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    state: Arc<Mutex<CircuitBreakerState>>,
    config: CircuitBreakerConfig,
    metrics: Option<Arc<Metrics>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                window_started: None,
                opened_at: None,
                probe_in_flight: false,
            })),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.update_circuit_breaker_state(&self.name, CircuitState::Closed);
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: IsTransient,
    {
        self.try_acquire()?;

        // A caller that gives up says nothing about the backend: dropping the
        // operation only frees the half-open slot. Deadlines are
        // reported separately through `record_timeout`.
        let mut guard = CallGuard {
            breaker: self,
            armed: true,
        };

        let outcome = operation.await;
        guard.armed = false;

        match outcome {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(err) if !err.is_transient() => {
                self.record_success();
                Err(CircuitBreakerError::OperationFailed(err))
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut state = self.lock();

        if state.state == CircuitState::Open {
            let cooled_down = state
                .opened_at
                .map(|opened| opened.elapsed() >= self.config.open_duration)
                .unwrap_or(true);
            if !cooled_down {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            self.transition(&mut state, CircuitState::HalfOpen);
            state.success_count = 0;
        }

        if state.state == CircuitState::HalfOpen {
            if state.probe_in_flight {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            state.probe_in_flight = true;
        }

        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.lock();

        match state.state {
            CircuitState::HalfOpen => {
                state.probe_in_flight = false;
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!(
                        breaker = %self.name,
                        successes = state.success_count,
                        "Circuit breaker closing after successful probe"
                    );
                    self.transition(&mut state, CircuitState::Closed);
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.window_started = None;
                    state.opened_at = None;
                }
            }
            CircuitState::Closed => {
                state.failure_count = 0;
                state.window_started = None;
            }
            CircuitState::Open => {
                // A call admitted before another caller opened the circuit
                tracing::debug!(breaker = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    fn record_failure(&self) {
        let mut state = self.lock();
        let now = Instant::now();

        match state.state {
            CircuitState::Closed => {
                let window_expired = state
                    .window_started
                    .map(|started| now.duration_since(started) > self.config.rolling_window)
                    .unwrap_or(true);
                if window_expired {
                    state.failure_count = 0;
                    state.window_started = Some(now);
                }

                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        "Circuit breaker opening"
                    );
                    self.transition(&mut state, CircuitState::Open);
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "Probe failed during half-open, reopening circuit");
                self.transition(&mut state, CircuitState::Open);
                state.probe_in_flight = false;
                state.success_count = 0;
                state.opened_at = Some(now);
            }
            CircuitState::Open => {
                state.opened_at = Some(now);
            }
        }
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        let from = state.state;
        if from == to {
            return;
        }
        state.state = to;

        tracing::info!(
            breaker = %self.name,
            from = from.as_str(),
            to = to.as_str(),
            "Circuit breaker transition"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_circuit_breaker_transition(&self.name, from.as_str(), to.as_str());
            metrics.update_circuit_breaker_state(&self.name, to);
        }
    }

    /// Count an expired deadline against the backend.
    pub fn record_timeout(&self) {
        tracing::warn!(breaker = %self.name, "Deadline expired, counting as failure");
        self.record_failure();
    }

    fn release_half_open_slot(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::HalfOpen {
            state.probe_in_flight = false;
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn get_failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}

struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(breaker = %self.breaker.name, "Protected call abandoned");
            self.breaker.release_half_open_slot();
        }
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

/// A short-circuited call is final: retrying it only burns the budget.
impl<E: IsTransient> IsTransient for CircuitBreakerError<E> {
    fn is_transient(&self) -> bool {
        match self {
            CircuitBreakerError::CircuitOpen => false,
            CircuitBreakerError::OperationFailed(e) => e.is_transient(),
        }
    }
}

// ============================================================================
// Circuit Breaker Registry
// ============================================================================
//
// One breaker per target name, shared by every caller of that target.
//
// ============================================================================

#[derive(Clone, Default)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
    metrics: Option<Arc<Metrics>>,
}

impl CircuitBreakerRegistry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            breakers: Arc::new(Mutex::new(HashMap::new())),
            metrics: Some(metrics),
        }
    }

    /// Return the breaker registered under `name`, creating it with `config`
    /// on first use. Later configs for an existing name are ignored.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> CircuitBreaker {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);

        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Registering circuit breaker");
                let breaker = CircuitBreaker::new(name, config);
                match &self.metrics {
                    Some(metrics) => breaker.with_metrics(metrics.clone()),
                    None => breaker,
                }
            })
            .clone()
    }

    /// Current state of every registered breaker, sorted by name
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<_> = breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.get_state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}
