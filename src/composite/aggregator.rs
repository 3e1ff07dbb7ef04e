use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::context::CallerContext;
use crate::error::ServiceError;
use crate::integration::{MemberBackend, OrganizationBackend, ReadOptions};
use crate::metrics::Metrics;
use crate::models::{Member, MemberSummary, OrganizationAggregate, ServiceAddresses};

// ============================================================================
// Aggregator
// ============================================================================
//
// Writes: one organization event, then one member event per listed member,
// in list order. There is no transaction across them; when a later emission
// fails the earlier events stay published.
//
// Reads: organization and members are read concurrently and zipped. An
// organization error fails the whole read and cancels the member read; the
// member path never fails.
//
// ============================================================================

pub struct Aggregator {
    organizations: Arc<dyn OrganizationBackend>,
    members: Arc<dyn MemberBackend>,
    service_address: String,
    metrics: Arc<Metrics>,
}

impl Aggregator {
    pub fn new(
        organizations: Arc<dyn OrganizationBackend>,
        members: Arc<dyn MemberBackend>,
        service_address: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            organizations,
            members,
            service_address: service_address.into(),
            metrics,
        }
    }

    pub async fn create(
        &self,
        ctx: &CallerContext,
        body: OrganizationAggregate,
    ) -> Result<(), ServiceError> {
        let span = tracing::info_span!(
            "composite_create",
            request_id = %Uuid::new_v4(),
            organization_id = body.organization_id
        );

        let result = self.emit_create(ctx, body).instrument(span).await;
        self.record("create", &result);
        result
    }

    async fn emit_create(
        &self,
        ctx: &CallerContext,
        body: OrganizationAggregate,
    ) -> Result<(), ServiceError> {
        ctx.audit("create", body.organization_id);
        validate(body.organization_id)?;

        let organization_id = body.organization_id;
        self.organizations.emit_create(body.organization()).await?;

        let members = body.members.unwrap_or_default();
        let total = members.len();
        for (emitted, summary) in members.iter().enumerate() {
            if let Err(e) = self
                .members
                .emit_create(Member::from_summary(organization_id, summary))
                .await
            {
                tracing::error!(
                    organization_id,
                    member_id = summary.member_id,
                    emitted_members = emitted,
                    total_members = total,
                    error = %e,
                    "Member emission failed, earlier events stay published"
                );
                return Err(e.into());
            }
        }

        tracing::info!(organization_id, members = total, "Composite create emitted");
        Ok(())
    }

    pub async fn get(
        &self,
        ctx: &CallerContext,
        organization_id: i32,
        options: ReadOptions,
    ) -> Result<OrganizationAggregate, ServiceError> {
        let span = tracing::info_span!(
            "composite_get",
            request_id = %Uuid::new_v4(),
            organization_id
        );

        let started = Instant::now();
        let result = self.read(ctx, organization_id, options).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.metrics
            .record_composite_read(outcome, started.elapsed().as_secs_f64());
        self.record("get", &result);
        result
    }

    async fn read(
        &self,
        ctx: &CallerContext,
        organization_id: i32,
        options: ReadOptions,
    ) -> Result<OrganizationAggregate, ServiceError> {
        ctx.audit("get", organization_id);
        validate(organization_id)?;

        let (organization, members) = tokio::try_join!(
            self.organizations.read(organization_id, options),
            async { Ok::<_, ServiceError>(self.members.read(organization_id).await) },
        )?;

        // The member address reported for the whole aggregate is the first
        // member's, whichever instance served the rest.
        let member_address = members
            .first()
            .map(|m| m.origin_address.clone())
            .unwrap_or_default();

        let summaries: Vec<MemberSummary> = members.iter().map(Member::summary).collect();

        tracing::debug!(
            organization_id,
            members = summaries.len(),
            "Composite read assembled"
        );

        Ok(OrganizationAggregate {
            organization_id: organization.organization_id,
            name: organization.name,
            country: organization.country,
            members: Some(summaries),
            service_addresses: Some(ServiceAddresses {
                composite: self.service_address.clone(),
                organization: organization.origin_address,
                member: member_address,
            }),
        })
    }

    /// Safe to repeat: both backends treat deletes of absent keys as no-ops.
    pub async fn delete(&self, ctx: &CallerContext, organization_id: i32) -> Result<(), ServiceError> {
        let span = tracing::info_span!(
            "composite_delete",
            request_id = %Uuid::new_v4(),
            organization_id
        );

        let result = async {
            ctx.audit("delete", organization_id);
            self.organizations.emit_delete(organization_id).await?;
            self.members.emit_delete(organization_id).await?;
            tracing::info!(organization_id, "Composite delete emitted");
            Ok::<(), ServiceError>(())
        }
        .instrument(span)
        .await;

        self.record("delete", &result);
        result
    }

    fn record<T>(&self, operation: &str, result: &Result<T, ServiceError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.metrics.record_composite_request(operation, outcome);
    }
}

fn validate(organization_id: i32) -> Result<(), ServiceError> {
    if organization_id < 1 {
        return Err(ServiceError::invalid_organization_id(organization_id));
    }
    Ok(())
}
