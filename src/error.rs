use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    services::{allocation::AllocationError, payment::PaymentError},
    state::{DraftError, SessionError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No session or entity exists for the key.
    #[error("not found: {0}")]
    NotFound(String),
    /// Invalid input provided by the user.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The event has no seat left.
    #[error("event is full")]
    EventFull,
    /// The team has no seat left.
    #[error("team is full")]
    TeamFull,
    /// The user already holds an active membership in the event.
    #[error("already a member of this event")]
    AlreadyMember,
    /// The user holds no active membership in the event.
    #[error("not a member of this event")]
    NotMember,
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Storage backend is unavailable.
    #[error("catalog unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("catalog unavailable (degraded mode)")]
    Degraded,
    /// Operation exceeded its timeout limit.
    #[error("catalog operation timed out")]
    Timeout,
    /// Concurrent writers kept winning the version race.
    #[error("catalog contention on event {0}")]
    Contention(uuid::Uuid),
    /// The payment collaborator refused or failed the transfer.
    #[error("payment failed")]
    Payment(#[source] PaymentError),
    /// Unexpected fault inside one interaction.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the failure comes from the catalog rather than from the user.
    pub fn is_catalog_unavailable(&self) -> bool {
        matches!(
            self,
            ServiceError::Unavailable(_)
                | ServiceError::Degraded
                | ServiceError::Timeout
                | ServiceError::Contention(_)
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            ServiceError::Unavailable(err)
        } else {
            ServiceError::Internal(err.to_string())
        }
    }
}

impl From<AllocationError> for ServiceError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Full => ServiceError::EventFull,
            invalid @ AllocationError::InvalidCount { .. } => {
                ServiceError::InvalidInput(invalid.to_string())
            }
        }
    }
}

impl From<DraftError> for ServiceError {
    fn from(err: DraftError) -> Self {
        match err {
            DraftError::InvalidInput(message) => ServiceError::InvalidInput(message),
            unexpected @ DraftError::UnexpectedStep { .. } => {
                ServiceError::InvalidInput(unexpected.to_string())
            }
        }
    }
}

impl From<SessionError<DraftError>> for ServiceError {
    fn from(err: SessionError<DraftError>) -> Self {
        match err {
            SessionError::NotFound => ServiceError::NotFound("no event draft in progress".into()),
            SessionError::Rejected(err) => err.into(),
        }
    }
}

impl From<PaymentError> for ServiceError {
    fn from(err: PaymentError) -> Self {
        ServiceError::Payment(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Upstream collaborator failed.
    #[error("bad gateway: {0}")]
    BadGateway(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            conflict @ (ServiceError::EventFull
            | ServiceError::TeamFull
            | ServiceError::AlreadyMember
            | ServiceError::NotMember) => AppError::Conflict(conflict.to_string()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
            contention @ ServiceError::Contention(_) => {
                AppError::ServiceUnavailable(contention.to_string())
            }
            ServiceError::Payment(source) => AppError::BadGateway(source.to_string()),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
