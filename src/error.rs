//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("unknown store backend: {0} (expected postgres or memory)")]
    UnknownStore(String),
}

/// Failures raised by the document layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{doctype} {name} not found")]
    NotFound { doctype: String, name: String },
    #[error("{doctype} {name} already exists")]
    Duplicate { doctype: String, name: String },
    #[error("{0}")]
    InvalidState(String),
    #[error("invalid field name: {0}")]
    InvalidField(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(doctype: &str, name: &str) -> Self {
        StoreError::NotFound {
            doctype: doctype.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Store(e) => match e {
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::Duplicate { .. } | StoreError::InvalidState(_) => StatusCode::FORBIDDEN,
                StoreError::InvalidField(_) => StatusCode::BAD_REQUEST,
                StoreError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn required(field: &str) -> Self {
        AppError::Validation(format!("{} is required", field))
    }
}

/// Maps a store `NotFound` to `AppError::NotFound(message)`; other errors pass through.
pub fn not_found_as(message: impl Into<String>) -> impl FnOnce(StoreError) -> AppError {
    let message = message.into();
    move |e| match e {
        StoreError::NotFound { .. } => AppError::NotFound(message),
        other => AppError::Store(other),
    }
}

/// Logs a failed handler operation before the error envelope is returned.
pub trait LogFailure<T> {
    fn log_failure(self, operation: &str) -> Result<T, AppError>;
}

impl<T, E: Into<AppError>> LogFailure<T> for Result<T, E> {
    fn log_failure(self, operation: &str) -> Result<T, AppError> {
        self.map_err(|e| {
            let e = e.into();
            tracing::error!(error = %e, "{} failed", operation);
            e
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(crate::response::api_error(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_mapping_follows_error_kind() {
        assert_eq!(AppError::required("name").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Store(StoreError::not_found("Lead", "L-1")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Store(StoreError::Duplicate {
                doctype: "Customer".into(),
                name: "Acme".into()
            })
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Store(StoreError::InvalidField("a b".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Internal("boom".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_renders_envelope() {
        let response = AppError::required("first_name").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["message"], "first_name is required");
    }
}
