use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy of the coin core plus the auth failures the HTTP
/// layer needs. None of these are retried; they are surfaced to the
/// immediate caller and translated to a status code here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient balance")]
    InsufficientFunds,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing or invalid token")]
    Unauthorized,

    #[error("operation not allowed for this account type")]
    Forbidden,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InsufficientFunds => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // the storage detail stays in the logs, not in the response body
        let message = match &self {
            AppError::Storage(err) => {
                tracing::error!("storage failure: {err}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            AppError::validation("amount must be positive").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::InsufficientFunds.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("recipient").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Storage(sqlx::Error::PoolClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
