use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diesel::result::Error as DieselError;
use serde_json::json;
use thiserror::Error;
use tower_sessions::session::Error as SessionError;
use validator::ValidationErrors;

/// Failures of the backing record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error")]
    Database(#[from] DieselError),
    #[error("Connection pool error")]
    Pool(#[from] r2d2::Error),
}

/// Errors surfaced by the scheduler's critical path.
#[derive(Error, Debug)]
pub enum SrsError {
    #[error("{0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Storage error")]
    Storage(#[from] StoreError),
}

/// Errors produced by the HTTP handlers on top of the scheduler.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in")]
    Unauthorized,
    #[error("Session error: {0}")]
    Session(String),
    #[error(transparent)]
    Srs(#[from] SrsError),
}

impl From<ValidationErrors> for SrsError {
    fn from(err: ValidationErrors) -> Self {
        SrsError::Validation(err.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::Srs(SrsError::from(err))
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err.to_string())
    }
}

impl IntoResponse for SrsError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SrsError::Validation(e) => (StatusCode::BAD_REQUEST, e),
            SrsError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            SrsError::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {}", e),
            ),
        };

        let body = json!({
            "error": message,
            "status": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => {
                let body = json!({
                    "error": "Not logged in",
                    "status": StatusCode::UNAUTHORIZED.as_u16()
                });
                (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
            }
            ApiError::Session(e) => {
                let body = json!({
                    "error": format!("Session error: {}", e),
                    "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16()
                });
                (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
            }
            ApiError::Srs(e) => e.into_response(),
        }
    }
}
