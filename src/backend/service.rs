use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use super::store::{MemberStore, OrganizationStore};
use crate::error::ServiceError;
use crate::models::{Member, Organization};

// ============================================================================
// Backend Services
// ============================================================================
//
// Create/read/delete logic for the organization and member domains. Reads
// take chaos parameters so the composite side's timeout, retry and breaker
// behavior can be exercised against a live backend.
//
// ============================================================================

/// Artificial latency and failure rate for a single read. Both off by default.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosParams {
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub fault_percent: u32,
}

impl ChaosParams {
    pub fn new(delay: u64, fault_percent: u32) -> Self {
        Self {
            delay,
            fault_percent,
        }
    }

    async fn apply(&self) -> Result<(), ServiceError> {
        if self.delay > 0 {
            tracing::debug!(delay_secs = self.delay, "Sleeping before read");
            tokio::time::sleep(Duration::from_secs(self.delay)).await;
        }

        if self.fault_percent == 0 {
            return Ok(());
        }

        let threshold = rand::thread_rng().gen_range(1..=100);
        if fault_triggered(self.fault_percent, threshold) {
            tracing::debug!(
                fault_percent = self.fault_percent,
                threshold,
                "Injected fault triggered"
            );
            return Err(ServiceError::BackendUnavailable(
                "Something went wrong...".to_string(),
            ));
        }

        Ok(())
    }
}

fn fault_triggered(fault_percent: u32, threshold: u32) -> bool {
    fault_percent >= threshold
}

fn validate_organization_id(organization_id: i32) -> Result<(), ServiceError> {
    if organization_id < 1 {
        return Err(ServiceError::invalid_organization_id(organization_id));
    }
    Ok(())
}

// ============================================================================
// Organization Service
// ============================================================================

pub struct OrganizationService {
    store: OrganizationStore,
    service_address: String,
}

impl OrganizationService {
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            store: OrganizationStore::default(),
            service_address: service_address.into(),
        }
    }

    pub fn create(&self, organization: Organization) -> Result<Organization, ServiceError> {
        validate_organization_id(organization.organization_id)?;

        let stored = self.store.insert(organization)?;
        tracing::debug!(organization_id = stored.organization_id, "Created organization");
        Ok(stored)
    }

    pub async fn get(
        &self,
        organization_id: i32,
        chaos: ChaosParams,
    ) -> Result<Organization, ServiceError> {
        validate_organization_id(organization_id)?;
        chaos.apply().await?;

        let organization = self.store.find(organization_id).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "No organization found for organizationId: {}",
                organization_id
            ))
        })?;

        tracing::debug!(organization_id, "Found organization");
        Ok(organization.with_origin(&self.service_address))
    }

    /// Removing an absent organization is not an error.
    pub fn delete(&self, organization_id: i32) -> Result<(), ServiceError> {
        validate_organization_id(organization_id)?;

        let removed = self.store.remove(organization_id);
        tracing::debug!(organization_id, removed, "Deleted organization");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}

// ============================================================================
// Member Service
// ============================================================================

pub struct MemberService {
    store: MemberStore,
    service_address: String,
}

impl MemberService {
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            store: MemberStore::default(),
            service_address: service_address.into(),
        }
    }

    pub fn create(&self, member: Member) -> Result<Member, ServiceError> {
        validate_organization_id(member.organization_id)?;

        let stored = self.store.insert(member)?;
        tracing::debug!(
            organization_id = stored.organization_id,
            member_id = stored.member_id,
            "Created member"
        );
        Ok(stored)
    }

    /// Members of one organization in insertion order. An organization
    /// without members yields an empty list, not `NotFound`.
    pub async fn list(
        &self,
        organization_id: i32,
        chaos: ChaosParams,
    ) -> Result<Vec<Member>, ServiceError> {
        validate_organization_id(organization_id)?;
        chaos.apply().await?;

        let members: Vec<Member> = self
            .store
            .find_by_organization(organization_id)
            .into_iter()
            .map(|m| m.with_origin(&self.service_address))
            .collect();

        tracing::debug!(organization_id, count = members.len(), "Listed members");
        Ok(members)
    }

    pub fn delete_all(&self, organization_id: i32) -> Result<(), ServiceError> {
        validate_organization_id(organization_id)?;

        let removed = self.store.remove_by_organization(organization_id);
        tracing::debug!(organization_id, removed, "Deleted members");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}
