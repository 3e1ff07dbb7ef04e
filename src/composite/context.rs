use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};

pub const SUBJECT_HEADER: &str = "X-Authenticated-Subject";
pub const SCOPES_HEADER: &str = "X-Authenticated-Scopes";

/// Who is calling, as asserted by whatever sits in front of the service.
/// Only used for audit logging; an anonymous caller is never rejected.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallerContext {
    subject: Option<String>,
    scopes: Vec<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(subject: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            scopes,
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let subject = headers
            .get(SUBJECT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let scopes = headers
            .get(SCOPES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self { subject, scopes }
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn audit(&self, operation: &str, organization_id: i32) {
        match &self.subject {
            Some(subject) => tracing::debug!(
                operation,
                organization_id,
                subject = %subject,
                scopes = ?self.scopes,
                "Caller authenticated"
            ),
            None => tracing::debug!(operation, organization_id, "Anonymous caller"),
        }
    }
}

impl FromRequest for CallerContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(Self::from_headers(req.headers())))
    }
}
