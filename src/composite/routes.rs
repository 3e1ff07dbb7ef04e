use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::time::Duration;

use super::aggregator::Aggregator;
use super::context::CallerContext;
use crate::error::{ApiError, ServiceError};
use crate::integration::ReadOptions;
use crate::models::OrganizationAggregate;

/// Register the composite routes. Expects `web::Data<Aggregator>`.
pub fn configure_composite(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::PathConfig::default()
            .error_handler(|_, req| ApiError::type_mismatch(req.path()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|_, req| ApiError::type_mismatch(req.path()).into()),
    )
    .app_data(web::JsonConfig::default().error_handler(|err, req| {
        ApiError::new(req.path(), ServiceError::InvalidPayload(err.to_string())).into()
    }))
    .service(web::resource("/aggregate").route(web::post().to(create_aggregate)))
    .service(
        web::resource("/aggregate/{organization_id}")
            .route(web::get().to(get_aggregate))
            .route(web::delete().to(delete_aggregate)),
    );
}

/// Chaos parameters forwarded to the organization backend, plus an optional
/// per-request timeout in seconds.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ReadQuery {
    #[serde(default)]
    delay: u64,
    #[serde(default)]
    fault_percent: u32,
    timeout: Option<u64>,
}

async fn create_aggregate(
    req: HttpRequest,
    ctx: CallerContext,
    body: web::Json<OrganizationAggregate>,
    aggregator: web::Data<Aggregator>,
) -> Result<HttpResponse, ApiError> {
    aggregator
        .create(&ctx, body.into_inner())
        .await
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().finish())
}

async fn get_aggregate(
    req: HttpRequest,
    ctx: CallerContext,
    path: web::Path<i32>,
    query: web::Query<ReadQuery>,
    aggregator: web::Data<Aggregator>,
) -> Result<HttpResponse, ApiError> {
    let options = ReadOptions {
        delay_secs: query.delay,
        fault_percent: query.fault_percent,
        timeout_override: query.timeout.map(Duration::from_secs),
    };

    let view = aggregator
        .get(&ctx, path.into_inner(), options)
        .await
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().json(view))
}

async fn delete_aggregate(
    req: HttpRequest,
    ctx: CallerContext,
    path: web::Path<i32>,
    aggregator: web::Data<Aggregator>,
) -> Result<HttpResponse, ApiError> {
    aggregator
        .delete(&ctx, path.into_inner())
        .await
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::fakes::{member, FixedMembers, FixedOrganizations};
    use crate::error::HttpErrorInfo;
    use crate::metrics::Metrics;
    use crate::models::Organization;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn aggregator() -> web::Data<Aggregator> {
        web::Data::new(Aggregator::new(
            Arc::new(FixedOrganizations::with(vec![Organization::new(1, "name", "country")])),
            Arc::new(FixedMembers::with(vec![member(1, 1, "member:7003")])),
            "composite:7000",
            Arc::new(Metrics::new().unwrap()),
        ))
    }

    #[actix_web::test]
    async fn test_get_aggregate() {
        let app = test::init_service(
            App::new()
                .app_data(aggregator())
                .configure(configure_composite),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/aggregate/1?delay=0&faultPercent=0")
            .insert_header(("X-Authenticated-Subject", "reader"))
            .to_request();
        let view: OrganizationAggregate = test::call_and_read_body_json(&app, req).await;

        assert_eq!(view.name, "name");
        assert_eq!(view.members.map(|m| m.len()), Some(1));
        assert_eq!(view.service_addresses.unwrap().composite, "composite:7000");
    }

    #[actix_web::test]
    async fn test_query_becomes_read_options() {
        let organizations = Arc::new(FixedOrganizations::with(vec![Organization::new(1, "name", "country")]));
        let aggregator = web::Data::new(Aggregator::new(
            organizations.clone(),
            Arc::new(FixedMembers::default()),
            "composite:7000",
            Arc::new(Metrics::new().unwrap()),
        ));
        let app = test::init_service(
            App::new()
                .app_data(aggregator)
                .configure(configure_composite),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/aggregate/1?delay=1&faultPercent=20&timeout=3")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(
            *organizations.last_options.lock().unwrap(),
            Some(ReadOptions {
                delay_secs: 1,
                fault_percent: 20,
                timeout_override: Some(Duration::from_secs(3)),
            })
        );

        let req = test::TestRequest::get().uri("/aggregate/1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(
            *organizations.last_options.lock().unwrap(),
            Some(ReadOptions::default())
        );
    }

    #[actix_web::test]
    async fn test_error_mapping() {
        let app = test::init_service(
            App::new()
                .app_data(aggregator())
                .configure(configure_composite),
        )
        .await;

        let req = test::TestRequest::get().uri("/aggregate/2").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: HttpErrorInfo = test::read_body_json(resp).await;
        assert_eq!(body.path, "/aggregate/2");
        assert_eq!(body.message, "No organization found for organizationId: 2");

        let req = test::TestRequest::get().uri("/aggregate/0").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let req = test::TestRequest::get().uri("/aggregate/one").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/aggregate")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"organizationId\":")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_unavailable_organization_is_503() {
        let aggregator = web::Data::new(Aggregator::new(
            Arc::new(FixedOrganizations::unavailable()),
            Arc::new(FixedMembers::default()),
            "composite:7000",
            Arc::new(Metrics::new().unwrap()),
        ));
        let app = test::init_service(
            App::new()
                .app_data(aggregator)
                .configure(configure_composite),
        )
        .await;

        let req = test::TestRequest::get().uri("/aggregate/1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_writes_answer_ok() {
        let app = test::init_service(
            App::new()
                .app_data(aggregator())
                .configure(configure_composite),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/aggregate")
            .set_json(OrganizationAggregate::new(5, "n", "c"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::delete().uri("/aggregate/5").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
