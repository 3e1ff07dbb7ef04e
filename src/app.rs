use actix::prelude::*;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

use crate::backend::{
    configure_member, configure_organization, EventProcessor, MemberService, OrganizationService,
};
use crate::composite::{configure_composite, Aggregator};
use crate::config::{AppConfig, BusType, ServiceRole};
use crate::integration::{
    MemberClient, OrganizationBackend, OrganizationClient, ResilientOrganizationBackend,
};
use crate::messaging::{
    spawn_forwarder, spawn_kafka_consumer, DirectChannel, EventChannel, InMemoryChannel,
    KafkaEventChannel,
};
use crate::metrics::{metrics_server, HealthState, Metrics};
use crate::models::{Member, Organization};
use crate::utils::CircuitBreakerRegistry;

// ============================================================================
// Application Wiring
// ============================================================================
//
// Builds the servers for the configured role. Nothing here runs them; the
// caller awaits (or spawns) the returned servers. Must be called from inside
// an actix system since the event processors are actors.
//
// Standalone runs all three services in one process and points the composite
// clients at the ports the backends actually bound.
//
// ============================================================================

type OrganizationChannel = Arc<dyn EventChannel<i32, Organization>>;
type MemberChannel = Arc<dyn EventChannel<i32, Member>>;

/// Ports actually bound, useful when the configuration asked for port 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundPorts {
    pub composite: Option<u16>,
    pub organization: Option<u16>,
    pub member: Option<u16>,
}

pub struct Running {
    pub servers: Vec<Server>,
    pub ports: BoundPorts,
}

struct Backend<S: Send + Sync + 'static> {
    service: Arc<S>,
    processor: Addr<EventProcessor<S>>,
}

fn start_backend<S>(service: S, metrics: &Arc<Metrics>) -> Backend<S>
where
    S: Send + Sync + 'static,
{
    let service = Arc::new(service);
    let processor = EventProcessor::new(service.clone(), metrics.clone()).start();
    Backend { service, processor }
}

pub fn build(config: &AppConfig, metrics: Arc<Metrics>) -> anyhow::Result<Running> {
    let breakers = CircuitBreakerRegistry::new(metrics.clone());
    let mut servers = Vec::new();
    let mut ports = BoundPorts::default();

    tracing::info!(role = ?config.role, bus = ?config.bus, "Wiring services");

    match config.role {
        ServiceRole::Standalone => {
            let organizations = start_backend(
                OrganizationService::new(config.address(config.organization_port)),
                &metrics,
            );
            let members = start_backend(
                MemberService::new(config.address(config.member_port)),
                &metrics,
            );

            let (server, port) = organization_server(config, organizations.service.clone())?;
            servers.push(server);
            ports.organization = Some(port);

            let (server, port) = member_server(config, members.service.clone())?;
            servers.push(server);
            ports.member = Some(port);

            let (organization_channel, member_channel) = match config.bus {
                BusType::InMemory => {
                    let (organization_channel, receiver) =
                        InMemoryChannel::<i32, Organization>::new("organizations");
                    spawn_forwarder(
                        "organizations".to_string(),
                        receiver,
                        organizations.processor.clone().recipient(),
                    );
                    let (member_channel, receiver) = InMemoryChannel::<i32, Member>::new("members");
                    spawn_forwarder(
                        "members".to_string(),
                        receiver,
                        members.processor.clone().recipient(),
                    );
                    (
                        Arc::new(organization_channel) as OrganizationChannel,
                        Arc::new(member_channel) as MemberChannel,
                    )
                }
                BusType::Direct => (
                    Arc::new(DirectChannel::<i32, Organization>::new(
                        "organizations",
                        organizations.processor.clone().recipient(),
                    )) as OrganizationChannel,
                    Arc::new(DirectChannel::<i32, Member>::new(
                        "members",
                        members.processor.clone().recipient(),
                    )) as MemberChannel,
                ),
                BusType::Kafka => {
                    subscribe_organizations(config, &organizations)?;
                    subscribe_members(config, &members)?;
                    kafka_channels(config, &breakers)?
                }
            };

            let organization_url =
                format!("http://127.0.0.1:{}", ports.organization.unwrap_or_default());
            let member_url = format!("http://127.0.0.1:{}", ports.member.unwrap_or_default());
            let aggregator = aggregator(
                config,
                &metrics,
                &breakers,
                &organization_url,
                &member_url,
                organization_channel,
                member_channel,
            );

            let (server, port) = composite_server(config, aggregator)?;
            servers.push(server);
            ports.composite = Some(port);
        }
        ServiceRole::Composite => {
            let (organization_channel, member_channel) = kafka_channels(config, &breakers)?;
            let aggregator = aggregator(
                config,
                &metrics,
                &breakers,
                &config.organization_url,
                &config.member_url,
                organization_channel,
                member_channel,
            );

            let (server, port) = composite_server(config, aggregator)?;
            servers.push(server);
            ports.composite = Some(port);
        }
        ServiceRole::Organization => {
            let organizations = start_backend(
                OrganizationService::new(config.address(config.organization_port)),
                &metrics,
            );
            subscribe_organizations(config, &organizations)?;

            let (server, port) = organization_server(config, organizations.service.clone())?;
            servers.push(server);
            ports.organization = Some(port);
        }
        ServiceRole::Member => {
            let members = start_backend(
                MemberService::new(config.address(config.member_port)),
                &metrics,
            );
            subscribe_members(config, &members)?;

            let (server, port) = member_server(config, members.service.clone())?;
            servers.push(server);
            ports.member = Some(port);
        }
    }

    let registry = Arc::new(metrics.registry().clone());
    let health = HealthState {
        service: format!("{:?}", config.role).to_lowercase(),
        breakers,
    };
    servers.push(metrics_server(registry, health, &config.host, config.metrics_port)?);

    Ok(Running { servers, ports })
}

fn aggregator(
    config: &AppConfig,
    metrics: &Arc<Metrics>,
    breakers: &CircuitBreakerRegistry,
    organization_url: &str,
    member_url: &str,
    organization_channel: OrganizationChannel,
    member_channel: MemberChannel,
) -> Arc<Aggregator> {
    let composite_address = config.address(config.composite_port);

    let organizations: Arc<dyn OrganizationBackend> = Arc::new(OrganizationClient::new(
        organization_url,
        config.organization_timeout,
        organization_channel,
        metrics.clone(),
    ));
    let organizations = ResilientOrganizationBackend::new(
        organizations,
        breakers,
        config.resilience.clone(),
        composite_address.clone(),
        metrics.clone(),
    );
    let members = MemberClient::new(
        member_url,
        config.member_timeout,
        member_channel,
        metrics.clone(),
    );

    Arc::new(Aggregator::new(
        Arc::new(organizations),
        Arc::new(members),
        composite_address,
        metrics.clone(),
    ))
}

fn kafka_channels(
    config: &AppConfig,
    breakers: &CircuitBreakerRegistry,
) -> anyhow::Result<(OrganizationChannel, MemberChannel)> {
    let kafka = &config.kafka;
    tracing::info!(brokers = %kafka.brokers, "Publishing events to Kafka");

    let organizations: OrganizationChannel = Arc::new(KafkaEventChannel::new(
        &kafka.brokers,
        &kafka.organization_topic,
        breakers,
    )?);
    let members: MemberChannel = Arc::new(KafkaEventChannel::new(
        &kafka.brokers,
        &kafka.member_topic,
        breakers,
    )?);
    Ok((organizations, members))
}

fn subscribe_organizations(
    config: &AppConfig,
    backend: &Backend<OrganizationService>,
) -> anyhow::Result<()> {
    let kafka = &config.kafka;
    spawn_kafka_consumer::<i32, Organization>(
        &kafka.brokers,
        &format!("{}-organization", kafka.consumer_group),
        &kafka.organization_topic,
        backend.processor.clone().recipient(),
    )?;
    Ok(())
}

fn subscribe_members(config: &AppConfig, backend: &Backend<MemberService>) -> anyhow::Result<()> {
    let kafka = &config.kafka;
    spawn_kafka_consumer::<i32, Member>(
        &kafka.brokers,
        &format!("{}-member", kafka.consumer_group),
        &kafka.member_topic,
        backend.processor.clone().recipient(),
    )?;
    Ok(())
}

// ============================================================================
// HTTP Servers
// ============================================================================

fn organization_server(
    config: &AppConfig,
    service: Arc<OrganizationService>,
) -> std::io::Result<(Server, u16)> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(service.clone()))
            .configure(configure_organization)
    })
    .workers(config.http_workers)
    .bind((config.host.as_str(), config.organization_port))?;

    let port = bound_port(server.addrs(), config.organization_port);
    tracing::info!("🏛️ Organization service listening on {}:{}", config.host, port);
    Ok((server.run(), port))
}

fn member_server(config: &AppConfig, service: Arc<MemberService>) -> std::io::Result<(Server, u16)> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(service.clone()))
            .configure(configure_member)
    })
    .workers(config.http_workers)
    .bind((config.host.as_str(), config.member_port))?;

    let port = bound_port(server.addrs(), config.member_port);
    tracing::info!("🎓 Member service listening on {}:{}", config.host, port);
    Ok((server.run(), port))
}

fn composite_server(
    config: &AppConfig,
    aggregator: Arc<Aggregator>,
) -> std::io::Result<(Server, u16)> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(aggregator.clone()))
            .configure(configure_composite)
    })
    .workers(config.http_workers)
    .bind((config.host.as_str(), config.composite_port))?;

    let port = bound_port(server.addrs(), config.composite_port);
    tracing::info!("🔗 Composite service listening on {}:{}", config.host, port);
    Ok((server.run(), port))
}

fn bound_port(addrs: Vec<std::net::SocketAddr>, requested: u16) -> u16 {
    addrs.first().map(|a| a.port()).unwrap_or(requested)
}
