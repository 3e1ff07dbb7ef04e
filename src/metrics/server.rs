use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use crate::utils::{CircuitBreakerRegistry, CircuitState};

/// What `/health` reports on: the breakers guarding backend reads.
#[derive(Clone)]
pub struct HealthState {
    pub service: String,
    pub breakers: CircuitBreakerRegistry,
}

/// Build the metrics HTTP server. The caller decides where it runs.
pub fn metrics_server(
    registry: Arc<Registry>,
    health: HealthState,
    host: &str,
    port: u16,
) -> std::io::Result<Server> {
    tracing::info!("📊 Starting metrics server on http://{}:{}/metrics", host, port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(health.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .workers(1)
    .bind((host, port))?
    .run();

    Ok(server)
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(health: web::Data<HealthState>) -> impl Responder {
    HttpResponse::Ok().json(health_report(&health))
}

// An open breaker does not make the service unhealthy: reads are still
// answered, with fallback values.
fn health_report(health: &HealthState) -> serde_json::Value {
    let states = health.breakers.snapshot();

    let degraded: Vec<String> = states
        .iter()
        .filter(|(_, state)| *state != CircuitState::Closed)
        .map(|(name, state)| format!("{}: circuit breaker {}", name, state.as_str()))
        .collect();

    let breakers: serde_json::Map<String, serde_json::Value> = states
        .iter()
        .map(|(name, state)| (name.clone(), serde_json::Value::from(state.as_str())))
        .collect();

    let status = if degraded.is_empty() { "healthy" } else { "degraded" };

    serde_json::json!({
        "status": status,
        "service": health.service,
        "breakers": breakers,
        "details": degraded,
    })
}
