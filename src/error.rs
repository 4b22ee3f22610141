use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::lifecycle::LifecycleError;
use crate::moderation::{GateError, ModerationError};
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Malformed or oversized input; user-correctable, never auto-retried.
    #[error("validation error: {0}")]
    Validation(String),
    /// State-machine rule violation.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("not found")]
    NotFound,
    #[error("parent comment not found")]
    InvalidParent,
    /// Feature-toggle rejection; the specific reason drives distinct UI.
    #[error("{0}")]
    PolicyRejected(String),
    #[error("forbidden")]
    Forbidden,
    #[error("conflict")]
    Conflict,
    #[error("rate limit exceeded")]
    RateLimited,
    /// Transient infrastructure failure; retried at the call site.
    #[error("store unavailable")]
    Unavailable,
    #[error("internal error")]
    Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Unavailable(reason) => {
                tracing::error!(%reason, "store unavailable");
                ApiError::Unavailable
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        ApiError::InvalidTransition(e.to_string())
    }
}

impl From<ModerationError> for ApiError {
    fn from(e: ModerationError) -> Self {
        ApiError::InvalidTransition(e.to_string())
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::CommentsDisabled | GateError::CaptchaRequired => {
                ApiError::PolicyRejected(e.to_string())
            }
            GateError::Validation { .. } => ApiError::Validation(e.to_string()),
            GateError::InvalidParent => ApiError::InvalidParent,
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidTransition(_) => StatusCode::CONFLICT,
            ApiError::NotFound | ApiError::InvalidParent => StatusCode::NOT_FOUND,
            ApiError::PolicyRejected(_) | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
