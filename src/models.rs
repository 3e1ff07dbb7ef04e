use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Models
// ============================================================================
//
// Records owned by the two backend services and the composite view the
// aggregator assembles from them. `origin_address` is stamped by whichever
// process served the read and is never persisted.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub organization_id: i32,
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub origin_address: String,
}

impl Organization {
    pub fn new(organization_id: i32, name: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            organization_id,
            name: name.into(),
            country: country.into(),
            origin_address: String::new(),
        }
    }

    pub fn with_origin(mut self, address: impl Into<String>) -> Self {
        self.origin_address = address.into();
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub organization_id: i32,
    pub member_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub section: String,
    #[serde(default)]
    pub origin_address: String,
}

impl Member {
    pub fn from_summary(organization_id: i32, summary: &MemberSummary) -> Self {
        Self {
            organization_id,
            member_id: summary.member_id,
            first_name: summary.first_name.clone(),
            last_name: summary.last_name.clone(),
            section: summary.section.clone(),
            origin_address: String::new(),
        }
    }

    pub fn summary(&self) -> MemberSummary {
        MemberSummary {
            member_id: self.member_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            section: self.section.clone(),
        }
    }

    pub fn with_origin(mut self, address: impl Into<String>) -> Self {
        self.origin_address = address.into();
        self
    }
}

// ============================================================================
// Composite View
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub member_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub section: String,
}

impl MemberSummary {
    pub fn new(
        member_id: i32,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        section: impl Into<String>,
    ) -> Self {
        Self {
            member_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            section: section.into(),
        }
    }
}

/// Which process served each part of a composite read.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ServiceAddresses {
    pub composite: String,
    pub organization: String,
    pub member: String,
}

/// The caller-facing aggregate. Used both as the write request body (where
/// `members` is optional and `service_addresses` is ignored) and as the
/// read response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationAggregate {
    pub organization_id: i32,
    pub name: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_addresses: Option<ServiceAddresses>,
}

impl OrganizationAggregate {
    pub fn new(organization_id: i32, name: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            organization_id,
            name: name.into(),
            country: country.into(),
            members: None,
            service_addresses: None,
        }
    }

    pub fn with_members(mut self, members: Vec<MemberSummary>) -> Self {
        self.members = Some(members);
        self
    }

    pub fn organization(&self) -> Organization {
        Organization::new(self.organization_id, self.name.clone(), self.country.clone())
    }
}
