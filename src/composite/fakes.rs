use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ServiceError;
use crate::integration::{MemberBackend, OrganizationBackend, ReadOptions};
use crate::messaging::ChannelError;
use crate::models::{Member, Organization};

pub(crate) const ORGANIZATION_ADDRESS: &str = "organization-host:7002";

/// Organization backend answering from a fixed map, optionally slowly.
#[derive(Default)]
pub(crate) struct FixedOrganizations {
    pub records: HashMap<i32, Organization>,
    pub unavailable: bool,
    pub latency: Duration,
    pub last_options: Mutex<Option<ReadOptions>>,
}

impl FixedOrganizations {
    pub fn with(records: Vec<Organization>) -> Self {
        Self {
            records: records.into_iter().map(|o| (o.organization_id, o)).collect(),
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl OrganizationBackend for FixedOrganizations {
    async fn read(&self, organization_id: i32, options: ReadOptions) -> Result<Organization, ServiceError> {
        *self.last_options.lock().unwrap() = Some(options);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.unavailable {
            return Err(ServiceError::BackendUnavailable("connection refused".into()));
        }
        self.records
            .get(&organization_id)
            .map(|o| o.clone().with_origin(ORGANIZATION_ADDRESS))
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No organization found for organizationId: {}",
                    organization_id
                ))
            })
    }

    async fn emit_create(&self, _: Organization) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn emit_delete(&self, _: i32) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Member backend answering from a fixed list, optionally slowly.
#[derive(Default)]
pub(crate) struct FixedMembers {
    pub members: Vec<Member>,
    pub latency: Duration,
    pub reads: AtomicU32,
}

impl FixedMembers {
    pub fn with(members: Vec<Member>) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemberBackend for FixedMembers {
    async fn read(&self, organization_id: i32) -> Vec<Member> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.members
            .iter()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect()
    }

    async fn emit_create(&self, _: Member) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn emit_delete(&self, _: i32) -> Result<(), ChannelError> {
        Ok(())
    }
}

pub(crate) fn member(organization_id: i32, member_id: i32, address: &str) -> Member {
    Member {
        organization_id,
        member_id,
        first_name: format!("first{}", member_id),
        last_name: format!("last{}", member_id),
        section: "section".into(),
        origin_address: address.into(),
    }
}
