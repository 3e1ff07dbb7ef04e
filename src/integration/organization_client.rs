use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::{translate_error, transport_error, OrganizationBackend, ReadOptions};
use crate::error::ServiceError;
use crate::events::Event;
use crate::messaging::{ChannelError, EventChannel};
use crate::metrics::Metrics;
use crate::models::Organization;

/// Organization backend as seen from the composite service: HTTP reads,
/// event-channel writes.
pub struct OrganizationClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    channel: Arc<dyn EventChannel<i32, Organization>>,
    metrics: Arc<Metrics>,
}

impl OrganizationClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        channel: Arc<dyn EventChannel<i32, Organization>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            channel,
            metrics,
        }
    }

    async fn emit(&self, event: Event<i32, Organization>) -> Result<(), ChannelError> {
        let kind = event.kind();
        let key = *event.key();

        self.channel.publish(event).await?;

        self.metrics
            .record_event_emitted(self.channel.name(), kind.as_str());
        tracing::debug!(
            channel = %self.channel.name(),
            kind = %kind,
            organization_id = key,
            "Emitted organization event"
        );
        Ok(())
    }
}

#[async_trait]
impl OrganizationBackend for OrganizationClient {
    async fn read(
        &self,
        organization_id: i32,
        options: ReadOptions,
    ) -> Result<Organization, ServiceError> {
        let timeout = options.timeout_override.unwrap_or(self.timeout);
        let url = format!(
            "{}/organization/{}?delay={}&faultPercent={}",
            self.base_url, organization_id, options.delay_secs, options.fault_percent
        );

        tracing::debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "Reading organization");

        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(translate_error(status, &body, &format!("HTTP {}", status)));
        }

        response
            .json::<Organization>()
            .await
            .map_err(|e| transport_error(e, timeout))
    }

    async fn emit_create(&self, organization: Organization) -> Result<(), ChannelError> {
        self.emit(Event::create(organization.organization_id, organization))
            .await
    }

    async fn emit_delete(&self, organization_id: i32) -> Result<(), ChannelError> {
        self.emit(Event::delete(organization_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::messaging::InMemoryChannel;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_writes_become_events() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (channel, mut receiver) = InMemoryChannel::<i32, Organization>::new("organizations");
        let client = OrganizationClient::new(
            "http://127.0.0.1:1",
            Duration::from_millis(200),
            Arc::new(channel),
            metrics.clone(),
        );

        client
            .emit_create(Organization::new(1, "name", "country"))
            .await
            .unwrap();
        client.emit_delete(1).await.unwrap();

        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::create(1, Organization::new(1, "name", "country"))
        );
        assert_eq!(receiver.recv().await.unwrap().kind(), EventKind::Delete);

        let emitted = metrics
            .events_emitted
            .with_label_values(&["organizations", "CREATE"])
            .get();
        assert_eq!(emitted, 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let (channel, _receiver) = InMemoryChannel::<i32, Organization>::new("organizations");
        let client = OrganizationClient::new(
            "http://127.0.0.1:1",
            Duration::from_millis(500),
            Arc::new(channel),
            Arc::new(Metrics::new().unwrap()),
        );

        let err = client.read(1, ReadOptions::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_override_beats_default_timeout() {
        // Accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (channel, _receiver) = InMemoryChannel::<i32, Organization>::new("organizations");
        let client = OrganizationClient::new(
            &format!("http://{}", address),
            Duration::from_secs(10),
            Arc::new(channel),
            Arc::new(Metrics::new().unwrap()),
        );
        let options = ReadOptions {
            timeout_override: Some(Duration::from_millis(200)),
            ..ReadOptions::default()
        };

        let started = std::time::Instant::now();
        let err = client.read(1, options).await.unwrap_err();

        assert!(matches!(err, ServiceError::BackendUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
