//! API error type with IntoResponse.
//!
//! Errors are converted to JSON bodies `{ "error", "message" }`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// Unknown document (404)
    NotFound { collection: String, id: String },

    /// Unknown collection or malformed body (400)
    BadRequest { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::NotFound { collection, id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("document '{}/{}' not found", collection, id)
                }),
            ),
            Self::BadRequest { message } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "bad_request",
                    "message": message
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
