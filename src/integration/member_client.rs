use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::{translate_error, transport_error, MemberBackend};
use crate::error::ServiceError;
use crate::events::Event;
use crate::messaging::{ChannelError, EventChannel};
use crate::metrics::Metrics;
use crate::models::Member;

/// Member backend as seen from the composite service. Reads never fail: a
/// composite view renders with zero members rather than not at all.
pub struct MemberClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    channel: Arc<dyn EventChannel<i32, Member>>,
    metrics: Arc<Metrics>,
}

impl MemberClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        channel: Arc<dyn EventChannel<i32, Member>>,
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

    async fn fetch(&self, organization_id: i32) -> Result<Vec<Member>, ServiceError> {
        let url = format!("{}/member?organizationId={}", self.base_url, organization_id);

        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(translate_error(status, &body, &format!("HTTP {}", status)));
        }

        response
            .json::<Vec<Member>>()
            .await
            .map_err(|e| transport_error(e, self.timeout))
    }

    async fn emit(&self, event: Event<i32, Member>) -> Result<(), ChannelError> {
        let kind = event.kind();
        let key = *event.key();

        self.channel.publish(event).await?;

        self.metrics
            .record_event_emitted(self.channel.name(), kind.as_str());
        tracing::debug!(
            channel = %self.channel.name(),
            kind = %kind,
            organization_id = key,
            "Emitted member event"
        );
        Ok(())
    }
}

#[async_trait]
impl MemberBackend for MemberClient {
    async fn read(&self, organization_id: i32) -> Vec<Member> {
        match self.fetch(organization_id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(
                    organization_id,
                    error = %e,
                    "Member read failed, returning no members"
                );
                Vec::new()
            }
        }
    }

    async fn emit_create(&self, member: Member) -> Result<(), ChannelError> {
        self.emit(Event::create(member.organization_id, member)).await
    }

    async fn emit_delete(&self, organization_id: i32) -> Result<(), ChannelError> {
        self.emit(Event::delete(organization_id)).await
    }
}
