use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Crate-wide error type.  The variants follow the failure classes the
/// handlers care about: who rejected us, and with which HTTP status we should
/// answer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Payment-provider webhook with a missing or invalid signature.
    #[error("invalid signature: {0}")]
    BadSignature(&'static str),
    /// Voice-provider webhook or cron trigger that failed authentication.
    #[error("unauthorized")]
    Unauthorized,
    /// Malformed client input on the booking endpoint.
    #[error("{0}")]
    BadRequest(String),
    /// A provider event referenced a Call that should exist but does not.
    #[error("call {0} not found")]
    CallNotFound(uuid::Uuid),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(String),
    /// Outbound call to a payment/voice/email provider failed.
    #[error("provider error: {0}")]
    Provider(String),
    #[error("render error: {0}")]
    Render(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadSignature(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::CallNotFound(_)
            | AppError::Db(_)
            | AppError::Storage(_)
            | AppError::Provider(_)
            | AppError::Render(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal detail stays in the logs; clients only get messages they
        // can act on.
        let body = match &self {
            AppError::BadSignature(_) | AppError::Unauthorized | AppError::BadRequest(_) => {
                self.to_string()
            }
            _ => "Internal server error".to_string(),
        };
        (status, Json(json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::BadSignature("missing header").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::BadRequest("bad age".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_errors_answer_500() {
        let err = AppError::Provider("elevenlabs said no".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
