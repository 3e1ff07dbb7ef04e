use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use super::service::{ChaosParams, MemberService, OrganizationService};
use crate::error::{ApiError, ServiceError};
use crate::models::{Member, Organization};

// ============================================================================
// Backend HTTP Routes
// ============================================================================
//
// Synchronous surface of the two backend services. Both expect their service
// registered as `web::Data` by the caller. Non-integer path and query values
// answer 400 "Type mismatch."; unreadable JSON bodies answer 422.
//
// ============================================================================

pub fn configure_organization(cfg: &mut web::ServiceConfig) {
    cfg.app_data(path_config())
        .app_data(query_config())
        .app_data(json_config())
        .service(web::resource("/organization").route(web::post().to(create_organization)))
        .service(
            web::resource("/organization/{organization_id}")
                .route(web::get().to(get_organization))
                .route(web::delete().to(delete_organization)),
        );
}

pub fn configure_member(cfg: &mut web::ServiceConfig) {
    cfg.app_data(query_config())
        .app_data(json_config())
        .service(
            web::resource("/member")
                .route(web::get().to(list_members))
                .route(web::post().to(create_member))
                .route(web::delete().to(delete_members)),
        );
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|_, req| ApiError::type_mismatch(req.path()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|_, req| ApiError::type_mismatch(req.path()).into())
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, req| {
        ApiError::new(req.path(), ServiceError::InvalidPayload(err.to_string())).into()
    })
}

// ============================================================================
// Organization
// ============================================================================

async fn get_organization(
    req: HttpRequest,
    path: web::Path<i32>,
    chaos: web::Query<ChaosParams>,
    service: web::Data<OrganizationService>,
) -> Result<HttpResponse, ApiError> {
    let organization_id = path.into_inner();
    tracing::debug!(organization_id, chaos = ?chaos.0, "GET organization");

    let organization = service
        .get(organization_id, chaos.into_inner())
        .await
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().json(organization))
}

async fn create_organization(
    req: HttpRequest,
    body: web::Json<Organization>,
    service: web::Data<OrganizationService>,
) -> Result<HttpResponse, ApiError> {
    let organization = service
        .create(body.into_inner())
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().json(organization))
}

async fn delete_organization(
    req: HttpRequest,
    path: web::Path<i32>,
    service: web::Data<OrganizationService>,
) -> Result<HttpResponse, ApiError> {
    service
        .delete(path.into_inner())
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().finish())
}

// ============================================================================
// Member
// ============================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MemberQuery {
    organization_id: i32,
    #[serde(default)]
    delay: u64,
    #[serde(default)]
    fault_percent: u32,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MemberKey {
    organization_id: i32,
}

async fn list_members(
    req: HttpRequest,
    query: web::Query<MemberQuery>,
    service: web::Data<MemberService>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    tracing::debug!(organization_id = query.organization_id, "GET members");

    let members = service
        .list(
            query.organization_id,
            ChaosParams::new(query.delay, query.fault_percent),
        )
        .await
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().json(members))
}

async fn create_member(
    req: HttpRequest,
    body: web::Json<Member>,
    service: web::Data<MemberService>,
) -> Result<HttpResponse, ApiError> {
    let member = service
        .create(body.into_inner())
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().json(member))
}

async fn delete_members(
    req: HttpRequest,
    query: web::Query<MemberKey>,
    service: web::Data<MemberService>,
) -> Result<HttpResponse, ApiError> {
    service
        .delete_all(query.organization_id)
        .map_err(|e| ApiError::new(req.path(), e))?;

    Ok(HttpResponse::Ok().finish())
}
