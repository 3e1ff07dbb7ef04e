// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::utils::CircuitState;

// Re-export for public API
pub use server::{metrics_server, HealthState};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Composite requests (outcome, read latency, fallbacks served)
// - Retry attempts and outcomes on backend reads
// - Circuit breaker states and transitions
// - Events emitted on outbound channels and applied by backend processors
//
// Every instance owns its registry, so tests can build as many as they like.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Composite Metrics
    pub composite_requests: IntCounterVec,
    pub composite_read_duration: HistogramVec,
    pub fallbacks_served: IntCounterVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGaugeVec,
    pub circuit_breaker_transitions: IntCounterVec,

    // Event Metrics
    pub events_emitted: IntCounterVec,
    pub events_processed: IntCounterVec,
    pub events_failed: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let composite_requests = IntCounterVec::new(
            Opts::new("composite_requests_total", "Composite requests by operation and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(composite_requests.clone()))?;

        let composite_read_duration = HistogramVec::new(
            HistogramOpts::new("composite_read_duration_seconds", "Composite read duration")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(composite_read_duration.clone()))?;

        let fallbacks_served = IntCounterVec::new(
            Opts::new("fallbacks_served_total", "Fallback values returned while a breaker was open"),
            &["breaker"],
        )?;
        registry.register(Box::new(fallbacks_served.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Operations that succeeded within the retry budget"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Operations that failed after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new(
                "circuit_breaker_state",
                "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
            ),
            &["breaker"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["breaker", "from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        let events_emitted = IntCounterVec::new(
            Opts::new("events_emitted_total", "Events placed on outbound channels"),
            &["channel", "kind"],
        )?;
        registry.register(Box::new(events_emitted.clone()))?;

        let events_processed = IntCounterVec::new(
            Opts::new("events_processed_total", "Events applied by backend processors"),
            &["domain", "kind"],
        )?;
        registry.register(Box::new(events_processed.clone()))?;

        let events_failed = IntCounterVec::new(
            Opts::new("events_failed_total", "Events rejected by backend processors"),
            &["domain", "reason"],
        )?;
        registry.register(Box::new(events_failed.clone()))?;

        Ok(Self {
            registry,
            composite_requests,
            composite_read_duration,
            fallbacks_served,
            retry_attempts_total,
            retry_success,
            retry_failure,
            circuit_breaker_state,
            circuit_breaker_transitions,
            events_emitted,
            events_processed,
            events_failed,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_composite_request(&self, operation: &str, outcome: &str) {
        self.composite_requests.with_label_values(&[operation, outcome]).inc();
    }

    pub fn record_composite_read(&self, outcome: &str, duration_secs: f64) {
        self.composite_read_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn record_fallback(&self, breaker: &str) {
        self.fallbacks_served.with_label_values(&[breaker]).inc();
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    pub fn update_circuit_breaker_state(&self, breaker: &str, state: CircuitState) {
        self.circuit_breaker_state.with_label_values(&[breaker]).set(state.gauge_value());
    }

    pub fn record_circuit_breaker_transition(&self, breaker: &str, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions.with_label_values(&[breaker, from_state, to_state]).inc();
    }

    pub fn record_event_emitted(&self, channel: &str, kind: &str) {
        self.events_emitted.with_label_values(&[channel, kind]).inc();
    }

    pub fn record_event_processed(&self, domain: &str, kind: &str) {
        self.events_processed.with_label_values(&[domain, kind]).inc();
    }

    pub fn record_event_failed(&self, domain: &str, reason: &str) {
        self.events_failed.with_label_values(&[domain, reason]).inc();
    }
}
