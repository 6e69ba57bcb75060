//! API error taxonomy and HTTP conversions.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::storage::StorageError;

/// Every failure the API can report. All variants render as a status code
/// plus a JSON `{message}` body; nothing is thrown past the handler layer.
#[derive(Debug)]
pub enum ApiError {
    InvalidCategory(String),
    InvalidContentType(String),
    MissingField(&'static str),
    BadRequest(String),
    Conflict(String),
    NotFound(String),
    Storage(String),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidCategory(_) => {
                (StatusCode::BAD_REQUEST, "Invalid type parameter".to_string())
            }
            ApiError::InvalidContentType(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::MissingField(field) => {
                (StatusCode::BAD_REQUEST, format!("{field} is required"))
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Conflict => {
                ApiError::Conflict("File with the same name already exists".into())
            }
            StorageError::NotFound => ApiError::NotFound("File not found".into()),
            StorageError::Io(err) => ApiError::Storage(err.to_string()),
        }
    }
}
