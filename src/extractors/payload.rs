//! Typed request input from a JSON body, a form body, or the query string.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Query, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use serde::de::DeserializeOwned;

/// Deserializes `T` from whichever carrier the caller used:
/// a form-encoded body, a JSON body, or (when the body is empty) the query string.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(&req) {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            return Ok(Payload(value));
        }
        let uri = req.uri().clone();
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            let Query(value) = Query::<T>::try_from_uri(&uri).map_err(|e| AppError::Validation(e.body_text()))?;
            return Ok(Payload(value));
        }
        serde_json::from_slice(&body)
            .map(Payload)
            .map_err(|e| AppError::Validation(format!("Invalid JSON payload: {}", e)))
    }
}
