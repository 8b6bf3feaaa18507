use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::identity::AuthError;
use crate::sql::DbError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("token error: {0}")]
    Token(#[from] AuthError),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Detail goes to the log only; callers get a generic message.
        let (status, error_type, code, msg) = match &self {
            AppError::Database(DbError::ConnectionAborted(e)) => {
                tracing::error!("Database connection aborted: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "database_unavailable",
                    "database unavailable".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "database_error",
                    "database query failed".to_string(),
                )
            }
            AppError::Token(e) => {
                tracing::error!("Token error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "token_unavailable",
                    "access token unavailable".to_string(),
                )
            }
            AppError::NotConfigured(what) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_configured",
                format!("{} is not configured", what),
            ),
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
