use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{OrganizationBackend, ReadOptions};
use crate::error::ServiceError;
use crate::messaging::ChannelError;
use crate::metrics::Metrics;
use crate::models::Organization;
use crate::utils::{
    retry_on_transient, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
    CircuitBreakerRegistry, RetryConfig, RetryResult,
};

// ============================================================================
// Resilient Organization Read
// ============================================================================
//
// deadline( retry( breaker( read ) ) )
//
// - retry only re-runs transient failures (BackendUnavailable)
// - the breaker counts those same failures; NotFound / InvalidPayload mean
//   the backend answered and pass straight through
// - a short-circuited call ends the retry loop and yields the fallback
// - the deadline bounds everything, backoff sleeps included; an expired
//   deadline is one breaker failure, a caller dropping the read is none
//
// Writes are delegated untouched.
//
// ============================================================================

pub const ORGANIZATION_BREAKER: &str = "organization";

#[derive(Clone, Debug)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub deadline: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            deadline: Duration::from_secs(5),
        }
    }
}

pub struct ResilientOrganizationBackend {
    inner: Arc<dyn OrganizationBackend>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    deadline: Duration,
    service_address: String,
    metrics: Arc<Metrics>,
}

impl ResilientOrganizationBackend {
    pub fn new(
        inner: Arc<dyn OrganizationBackend>,
        breakers: &CircuitBreakerRegistry,
        config: ResilienceConfig,
        service_address: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner,
            breaker: breakers.get_or_create(ORGANIZATION_BREAKER, config.breaker),
            retry: config.retry,
            deadline: config.deadline,
            service_address: service_address.into(),
            metrics,
        }
    }

    /// Stand-in served while the breaker is open. Name and country both
    /// embed the requested id so callers can tell it from a real record.
    fn fallback(&self, organization_id: i32) -> Organization {
        tracing::warn!(
            organization_id,
            breaker = %self.breaker.name(),
            "Circuit open, serving fallback organization"
        );
        self.metrics.record_fallback(self.breaker.name());

        let sentinel = format!("Fallback organization{}", organization_id);
        Organization::new(organization_id, sentinel.clone(), sentinel)
            .with_origin(&self.service_address)
    }
}

#[async_trait]
impl OrganizationBackend for ResilientOrganizationBackend {
    async fn read(
        &self,
        organization_id: i32,
        options: ReadOptions,
    ) -> Result<Organization, ServiceError> {
        let attempts = retry_on_transient(ORGANIZATION_BREAKER, self.retry.clone(), |attempt| {
            let inner = self.inner.clone();
            let breaker = self.breaker.clone();
            let metrics = self.metrics.clone();
            async move {
                if attempt > 1 {
                    metrics.record_retry_attempt(ORGANIZATION_BREAKER, attempt);
                }
                breaker.call(inner.read(organization_id, options)).await
            }
        });

        let outcome = match tokio::time::timeout(self.deadline, attempts).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    organization_id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Organization read exceeded its deadline"
                );
                self.breaker.record_timeout();
                self.metrics.record_retry_outcome(ORGANIZATION_BREAKER, false);
                return Err(ServiceError::BackendUnavailable(format!(
                    "Organization read for organizationId: {} timed out",
                    organization_id
                )));
            }
        };

        match outcome {
            RetryResult::Success(organization) => {
                self.metrics.record_retry_outcome(ORGANIZATION_BREAKER, true);
                Ok(organization)
            }
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => match e {
                CircuitBreakerError::CircuitOpen => Ok(self.fallback(organization_id)),
                CircuitBreakerError::OperationFailed(e) => {
                    if matches!(e, ServiceError::BackendUnavailable(_)) {
                        self.metrics.record_retry_outcome(ORGANIZATION_BREAKER, false);
                    }
                    Err(e)
                }
            },
        }
    }

    async fn emit_create(&self, organization: Organization) -> Result<(), ChannelError> {
        self.inner.emit_create(organization).await
    }

    async fn emit_delete(&self, organization_id: i32) -> Result<(), ChannelError> {
        self.inner.emit_delete(organization_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CircuitState;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Answers reads from a script; an exhausted script means "backend down".
    struct ScriptedBackend {
        calls: AtomicU32,
        script: Mutex<VecDeque<Result<Organization, ServiceError>>>,
        latency: Duration,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<Organization, ServiceError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script.into()),
                latency: Duration::ZERO,
            }
        }

        fn down() -> Self {
            Self::new(vec![])
        }

        fn slow(latency: Duration) -> Self {
            Self::slow_answering(latency, vec![])
        }

        fn slow_answering(
            latency: Duration,
            script: Vec<Result<Organization, ServiceError>>,
        ) -> Self {
            Self {
                latency,
                ..Self::new(script)
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrganizationBackend for ScriptedBackend {
        async fn read(&self, _: i32, _: ReadOptions) -> Result<Organization, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::BackendUnavailable("connection refused".into())))
        }

        async fn emit_create(&self, _: Organization) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn emit_delete(&self, _: i32) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn config(failure_threshold: u32, deadline: Duration) -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
            },
            breaker: CircuitBreakerConfig {
                failure_threshold,
                rolling_window: Duration::from_secs(60),
                open_duration: Duration::from_millis(200),
                success_threshold: 1,
            },
            deadline,
        }
    }

    fn wrap(
        backend: Arc<ScriptedBackend>,
        config: ResilienceConfig,
    ) -> (ResilientOrganizationBackend, CircuitBreakerRegistry, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = CircuitBreakerRegistry::new(metrics.clone());
        let resilient =
            ResilientOrganizationBackend::new(backend, &registry, config, "composite:7000", metrics.clone());
        (resilient, registry, metrics)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(ServiceError::BackendUnavailable("blip".into())),
            Ok(Organization::new(1, "name", "country")),
        ]));
        let (resilient, _, _) = wrap(backend.clone(), config(5, Duration::from_secs(2)));

        let organization = resilient.read(1, ReadOptions::default()).await.unwrap();
        assert_eq!(organization.name, "name");
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_not_found_passes_through_untouched() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(ServiceError::NotFound(
            "No organization found for organizationId: 13".into(),
        ))]));
        let (resilient, registry, _) = wrap(backend.clone(), config(1, Duration::from_secs(2)));

        let err = resilient.read(13, ReadOptions::default()).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::NotFound("No organization found for organizationId: 13".into())
        );
        assert_eq!(backend.calls(), 1);
        assert_eq!(
            registry.snapshot(),
            vec![(ORGANIZATION_BREAKER.to_string(), CircuitState::Closed)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_unavailable_while_closed() {
        let backend = Arc::new(ScriptedBackend::down());
        let (resilient, _, metrics) = wrap(backend.clone(), config(10, Duration::from_secs(2)));

        let err = resilient.read(1, ReadOptions::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::BackendUnavailable(_)));
        assert_eq!(backend.calls(), 3);

        let failures = metrics
            .retry_failure
            .with_label_values(&[ORGANIZATION_BREAKER])
            .get();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_serves_fallback_without_calling() {
        let backend = Arc::new(ScriptedBackend::down());
        let (resilient, registry, metrics) = wrap(backend.clone(), config(3, Duration::from_secs(2)));

        // Third failed attempt opens the circuit, ending the retry loop
        let first = resilient.read(1, ReadOptions::default()).await;
        assert!(first.is_err());
        assert_eq!(backend.calls(), 3);
        assert_eq!(registry.snapshot()[0].1, CircuitState::Open);

        let started = std::time::Instant::now();
        let fallback = resilient.read(42, ReadOptions::default()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(backend.calls(), 3);

        assert_eq!(fallback.organization_id, 42);
        assert_eq!(fallback.name, "Fallback organization42");
        assert_eq!(fallback.country, "Fallback organization42");
        assert_eq!(fallback.origin_address, "composite:7000");

        let served = metrics
            .fallbacks_served
            .with_label_values(&[ORGANIZATION_BREAKER])
            .get();
        assert_eq!(served, 1);
    }

    #[tokio::test]
    async fn test_breaker_recovers_after_cool_down() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(ServiceError::BackendUnavailable("down".into())),
            Ok(Organization::new(1, "name", "country")),
        ]));
        let mut cfg = config(1, Duration::from_secs(2));
        cfg.retry.max_attempts = 1;
        let (resilient, registry, _) = wrap(backend.clone(), cfg);

        assert!(resilient.read(1, ReadOptions::default()).await.is_err());
        assert_eq!(registry.snapshot()[0].1, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(250)).await;

        let organization = resilient.read(1, ReadOptions::default()).await.unwrap();
        assert_eq!(organization.name, "name");
        assert_eq!(registry.snapshot()[0].1, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_deadline_bounds_slow_backend() {
        let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(5)));
        let (resilient, _, _) = wrap(backend, config(5, Duration::from_millis(200)));

        let started = std::time::Instant::now();
        let err = resilient.read(1, ReadOptions::default()).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            err,
            ServiceError::BackendUnavailable(
                "Organization read for organizationId: 1 timed out".into()
            )
        );
    }

    #[tokio::test]
    async fn test_expired_deadline_counts_against_breaker() {
        let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(5)));
        let (resilient, registry, _) = wrap(backend.clone(), config(1, Duration::from_millis(100)));

        assert!(resilient.read(1, ReadOptions::default()).await.is_err());
        assert_eq!(registry.snapshot()[0].1, CircuitState::Open);

        let fallback = resilient.read(1, ReadOptions::default()).await.unwrap();
        assert_eq!(fallback.name, "Fallback organization1");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_callers_giving_up_do_not_open_breaker() {
        let backend = Arc::new(ScriptedBackend::slow_answering(
            Duration::from_millis(300),
            vec![Ok(Organization::new(1, "name", "country"))],
        ));
        let (resilient, registry, _) = wrap(backend.clone(), config(3, Duration::from_secs(2)));

        // Callers disconnect long before the backend answers
        for _ in 0..5 {
            let read = resilient.read(1, ReadOptions::default());
            assert!(tokio::time::timeout(Duration::from_millis(50), read).await.is_err());
        }
        assert_eq!(backend.calls(), 5);
        assert_eq!(registry.snapshot()[0].1, CircuitState::Closed);

        let organization = resilient.read(1, ReadOptions::default()).await.unwrap();
        assert_eq!(organization.name, "name");
    }

    #[tokio::test]
    async fn test_shared_breaker_across_wrappers() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = CircuitBreakerRegistry::new(metrics.clone());
        let backend = Arc::new(ScriptedBackend::down());

        let mut cfg = config(2, Duration::from_secs(2));
        cfg.retry.max_attempts = 1;
        let a = ResilientOrganizationBackend::new(backend.clone(), &registry, cfg.clone(), "a", metrics.clone());
        let b = ResilientOrganizationBackend::new(backend.clone(), &registry, cfg, "b", metrics);

        assert!(a.read(1, ReadOptions::default()).await.is_err());
        assert!(b.read(1, ReadOptions::default()).await.is_err());

        // Both failures landed on the same breaker
        let fallback = a.read(1, ReadOptions::default()).await.unwrap();
        assert_eq!(fallback.origin_address, "a");
        assert_eq!(backend.calls(), 2);
    }
}
