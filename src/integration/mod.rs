// ============================================================================
// Backend Integration
// ============================================================================
//
// How the composite service talks to the two backends: reads go out over
// HTTP under a per-call timeout, writes become events on the domain's
// outbound channel. The organization read path is additionally wrapped in
// retry, circuit breaker and an overall deadline.
//
// ============================================================================

mod member_client;
mod organization_client;
mod resilience;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::error::{HttpErrorInfo, ServiceError};
use crate::messaging::ChannelError;
use crate::models::{Member, Organization};

pub use member_client::MemberClient;
pub use organization_client::OrganizationClient;
pub use resilience::{ResilienceConfig, ResilientOrganizationBackend, ORGANIZATION_BREAKER};

/// Per-read knobs. `delay_secs` and `fault_percent` are forwarded to the
/// backend's chaos parameters; `timeout_override` replaces the client's
/// configured per-call timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReadOptions {
    pub delay_secs: u64,
    pub fault_percent: u32,
    pub timeout_override: Option<Duration>,
}

#[async_trait]
pub trait OrganizationBackend: Send + Sync {
    async fn read(
        &self,
        organization_id: i32,
        options: ReadOptions,
    ) -> Result<Organization, ServiceError>;

    async fn emit_create(&self, organization: Organization) -> Result<(), ChannelError>;

    async fn emit_delete(&self, organization_id: i32) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait MemberBackend: Send + Sync {
    /// Members of an organization in backend order. Backend failures degrade
    /// to an empty list.
    async fn read(&self, organization_id: i32) -> Vec<Member>;

    async fn emit_create(&self, member: Member) -> Result<(), ChannelError>;

    /// Removes every member of the organization.
    async fn emit_delete(&self, organization_id: i32) -> Result<(), ChannelError>;
}

/// Turn a non-2xx backend answer into a `ServiceError`. The message comes
/// from the `{ path, message, timestamp }` body when it parses, `fallback`
/// otherwise.
pub(crate) fn translate_error(status: StatusCode, body: &str, fallback: &str) -> ServiceError {
    let message = serde_json::from_str::<HttpErrorInfo>(body)
        .map(|info| info.message)
        .unwrap_or_else(|_| fallback.to_string());

    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY => ServiceError::InvalidPayload(message),
        _ => {
            tracing::warn!(status = %status, error = %message, "Unexpected backend error");
            ServiceError::BackendUnavailable(message)
        }
    }
}

pub(crate) fn transport_error(error: reqwest::Error, timeout: Duration) -> ServiceError {
    if error.is_timeout() {
        ServiceError::BackendUnavailable(format!(
            "Backend did not answer within {}ms",
            timeout.as_millis()
        ))
    } else {
        ServiceError::BackendUnavailable(error.to_string())
    }
}
