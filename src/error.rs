use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::IsTransient;

// ============================================================================
// Service Errors
// ============================================================================
//
// One taxonomy shared by the composite service and both backends. The
// Display text is the bare message so it can travel unchanged through the
// `{ path, message, timestamp }` error body and back out of a client.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("{0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    EventProcessing(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::EventProcessing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidPayload(_) => "invalid_payload",
            ServiceError::BackendUnavailable(_) => "backend_unavailable",
            ServiceError::EventProcessing(_) => "event_processing",
        }
    }

    pub fn invalid_organization_id(id: i32) -> Self {
        ServiceError::InvalidPayload(format!("Invalid organizationId: {}", id))
    }
}

impl IsTransient for ServiceError {
    fn is_transient(&self) -> bool {
        matches!(self, ServiceError::BackendUnavailable(_))
    }
}

// ============================================================================
// HTTP Error Body
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HttpErrorInfo {
    pub path: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HttpErrorInfo {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Error returned by HTTP handlers: a status plus the request path the
/// error body must echo.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    path: String,
    message: String,
}

impl ApiError {
    pub fn new(path: impl Into<String>, error: ServiceError) -> Self {
        Self {
            status: error.status_code(),
            path: path.into(),
            message: error.to_string(),
        }
    }

    pub fn type_mismatch(path: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            path: path.into(),
            message: "Type mismatch.".to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(HttpErrorInfo::new(&self.path, &self.message))
    }
}
