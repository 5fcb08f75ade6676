use crate::services::paste_service::PasteError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<PasteError> for AppError {
    fn from(err: PasteError) -> Self {
        match err {
            PasteError::InvalidArgument(msg) => AppError::new(StatusCode::BAD_REQUEST, msg),
            PasteError::Unavailable => AppError::not_found(err.to_string()),
            PasteError::CreationFailed => AppError::internal(err.to_string()),
            // Retryable; must not read as "paste gone".
            PasteError::Transient(_) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::paste_store::StoreError;

    #[test]
    fn paste_errors_map_to_http_statuses() {
        let cases = [
            (
                PasteError::InvalidArgument("ttl_seconds must be an integer >= 1".into()),
                StatusCode::BAD_REQUEST,
                "ttl_seconds must be an integer >= 1",
            ),
            (
                PasteError::Unavailable,
                StatusCode::NOT_FOUND,
                "paste unavailable",
            ),
            (
                PasteError::CreationFailed,
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not allocate a unique paste id",
            ),
            (
                PasteError::Transient(StoreError::Timeout("get")),
                StatusCode::SERVICE_UNAVAILABLE,
                "storage temporarily unavailable",
            ),
        ];

        for (err, status, message) in cases {
            let app = AppError::from(err);
            assert_eq!(app.status, status);
            assert_eq!(app.message, message);
        }
    }

    #[test]
    fn transient_errors_do_not_leak_storage_details() {
        let app = AppError::from(PasteError::Transient(StoreError::CorruptRecord {
            id: "abc".into(),
            reason: "max_views (Some(1)) and remaining_views (None) disagree".into(),
        }));
        assert!(!app.message.contains("abc"));
        assert_eq!(app.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
