use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::ServiceError;
use crate::models::{Member, Organization};

// ============================================================================
// In-Memory Stores
// ============================================================================
//
// Stand-ins for whatever key-value or document store a deployment uses.
// Records are kept without `origin_address`; the service stamps it on read.
//
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
struct OrganizationEntity {
    organization_id: i32,
    name: String,
    country: String,
}

impl From<Organization> for OrganizationEntity {
    fn from(record: Organization) -> Self {
        Self {
            organization_id: record.organization_id,
            name: record.name,
            country: record.country,
        }
    }
}

impl OrganizationEntity {
    fn to_record(&self) -> Organization {
        Organization::new(self.organization_id, self.name.clone(), self.country.clone())
    }
}

#[derive(Default)]
pub struct OrganizationStore {
    records: RwLock<HashMap<i32, OrganizationEntity>>,
}

impl OrganizationStore {
    pub fn insert(&self, record: Organization) -> Result<Organization, ServiceError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let id = record.organization_id;

        if records.contains_key(&id) {
            return Err(ServiceError::InvalidPayload(format!(
                "Organization Id: {} already exists!",
                id
            )));
        }

        let entity = OrganizationEntity::from(record);
        let stored = entity.to_record();
        records.insert(id, entity);
        Ok(stored)
    }

    pub fn find(&self, organization_id: i32) -> Option<Organization> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(&organization_id).map(OrganizationEntity::to_record)
    }

    /// Returns whether a record was actually removed.
    pub fn remove(&self, organization_id: i32) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(&organization_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Clone, Debug, PartialEq)]
struct MemberEntity {
    member_id: i32,
    first_name: String,
    last_name: String,
    section: String,
}

/// Members grouped by organization, in insertion order. `(organizationId,
/// memberId)` is unique.
#[derive(Default)]
pub struct MemberStore {
    records: RwLock<HashMap<i32, Vec<MemberEntity>>>,
}

impl MemberStore {
    pub fn insert(&self, record: Member) -> Result<Member, ServiceError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let members = records.entry(record.organization_id).or_default();

        if members.iter().any(|m| m.member_id == record.member_id) {
            return Err(ServiceError::InvalidPayload(format!(
                "Member with organizationId: {} and memberId: {} already exists!",
                record.organization_id, record.member_id
            )));
        }

        members.push(MemberEntity {
            member_id: record.member_id,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            section: record.section.clone(),
        });

        Ok(Member {
            origin_address: String::new(),
            ..record
        })
    }

    pub fn find_by_organization(&self, organization_id: i32) -> Vec<Member> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&organization_id)
            .map(|members| {
                members
                    .iter()
                    .map(|m| Member {
                        organization_id,
                        member_id: m.member_id,
                        first_name: m.first_name.clone(),
                        last_name: m.last_name.clone(),
                        section: m.section.clone(),
                        origin_address: String::new(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns how many members were removed.
    pub fn remove_by_organization(&self, organization_id: i32) -> usize {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(&organization_id).map(|m| m.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(organization_id: i32, member_id: i32) -> Member {
        Member {
            organization_id,
            member_id,
            first_name: format!("first {}", member_id),
            last_name: "last".into(),
            section: "section".into(),
            origin_address: "ignored".into(),
        }
    }

    #[test]
    fn test_organization_duplicate_rejected() {
        let store = OrganizationStore::default();
        store.insert(Organization::new(1, "n", "c")).unwrap();

        let err = store.insert(Organization::new(1, "other", "c")).unwrap_err();
        assert_eq!(
            err,
            ServiceError::InvalidPayload("Organization Id: 1 already exists!".into())
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_origin_address_is_not_persisted() {
        let store = OrganizationStore::default();
        store
            .insert(Organization::new(1, "n", "c").with_origin("host:1"))
            .unwrap();

        assert_eq!(store.find(1).unwrap().origin_address, "");
    }

    #[test]
    fn test_member_uniqueness_is_per_organization() {
        let store = MemberStore::default();
        store.insert(member(1, 1)).unwrap();
        store.insert(member(2, 1)).unwrap();

        let err = store.insert(member(1, 1)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidPayload(msg)
            if msg == "Member with organizationId: 1 and memberId: 1 already exists!"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_members_keep_insertion_order() {
        let store = MemberStore::default();
        for id in [3, 1, 2] {
            store.insert(member(1, id)).unwrap();
        }

        let ids: Vec<i32> = store
            .find_by_organization(1)
            .iter()
            .map(|m| m.member_id)
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = MemberStore::default();
        store.insert(member(1, 1)).unwrap();
        store.insert(member(1, 2)).unwrap();

        assert_eq!(store.remove_by_organization(1), 2);
        assert_eq!(store.remove_by_organization(1), 0);
        assert!(store.find_by_organization(1).is_empty());
    }
}
