/// Error types for the social feed service
///
/// Domain failures (validation, missing records, authorization) pass through the
/// consistency layer unchanged. Store failures that abort a unit are reported as
/// `CoordinatorAbort`, carrying the operation name and the underlying cause.
use crate::store::StoreError;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use once_cell::sync::OnceCell;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, AppError>;

static EXPOSE_DETAILS: OnceCell<bool> = OnceCell::new();

/// Decide once at startup whether 5xx responses include the underlying cause.
pub fn expose_error_details(enabled: bool) {
    let _ = EXPOSE_DETAILS.set(enabled);
}

fn details_exposed() -> bool {
    EXPOSE_DETAILS.get().copied().unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// An atomic unit was rolled back because the store rejected it.
    #[error("{operation} aborted: {source}")]
    CoordinatorAbort {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{service} error: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    /// True for store failures that re-running the unit may resolve.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// True when the unit may have committed even though an error came back.
    pub fn commit_outcome_unknown(&self) -> bool {
        matches!(
            self,
            AppError::CoordinatorAbort {
                source: StoreError::CommitOutcomeUnknown(_),
                ..
            } | AppError::Store(StoreError::CommitOutcomeUnknown(_))
        )
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::CoordinatorAbort { operation, .. } => {
                format!("Unable to complete {operation}")
            }
            AppError::ExternalService { service, .. } => format!("{service} is unavailable"),
            AppError::Store(_) | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            AppError::CoordinatorAbort { .. } | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let detail = if status.is_server_error() && !details_exposed() {
            serde_json::Value::Null
        } else {
            serde_json::Value::String(self.to_string())
        };

        HttpResponse::build(status).json(serde_json::json!({
            "success": false,
            "message": self.public_message(),
            "error": detail,
        }))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
