use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// ValidationError
///
/// Structured rejection of an input payload. Raised before any storage call so a
/// rejected write never touches the database.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A required field was absent, null, or blank.
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// A numeric field fell outside its permitted closed interval.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    /// The JSON body or a path parameter could not be parsed.
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Missing { .. } => "MISSING_FIELD",
            ValidationError::OutOfRange { .. } => "OUT_OF_RANGE",
            ValidationError::Malformed(_) => "MALFORMED_BODY",
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::Missing { field } | ValidationError::OutOfRange { field, .. } => {
                Some(field)
            }
            ValidationError::Malformed(_) => None,
        }
    }
}

/// AppError
///
/// The single error taxonomy shared by the repository and the HTTP layer.
/// Each variant maps onto exactly one status code in `into_response`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No bearer token was presented on an admin route.
    #[error("authentication required")]
    AuthenticationRequired,

    /// A bearer token was presented but failed signature or expiry checks.
    #[error("authentication rejected")]
    AuthenticationRejected,

    /// Login failed. Deliberately identical for unknown users and wrong passwords.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Referential violation, e.g. attaching an image to a group that does not exist.
    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        AppError::NotFound { entity }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AuthenticationRequired | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AuthenticationRejected => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(v) => v.code(),
            AppError::AuthenticationRequired => "AUTH_REQUIRED",
            AppError::AuthenticationRejected => "AUTH_REJECTED",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Store(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// ErrorResponse
///
/// JSON body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    /// Human-readable message. Never contains storage internals.
    pub error: String,
    /// Stable machine-readable code, e.g. `MISSING_FIELD` or `AUTH_REJECTED`.
    pub code: String,
    /// The offending field for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, field) = match &self {
            AppError::Validation(v) => (v.to_string(), v.field().map(str::to_string)),
            AppError::Store(e) => {
                // Raw persistence errors stay in the server log.
                tracing::error!(error = ?e, "store error");
                ("internal server error".to_string(), None)
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                ("internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        let body = ErrorResponse {
            error: message,
            code: self.code().to_string(),
            field,
        };

        (status, Json(body)).into_response()
    }
}
