//! Request-scoped caller identity (e.g. `X-CRM-User` header).

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying the acting user. Default: `X-CRM-User`.
pub const USER_HEADER: &str = "X-CRM-User";

/// Owner recorded when no user header is sent.
pub const DEFAULT_USER: &str = "Administrator";

/// Who is making the request. Passed explicitly to every operation that records an owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub user: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        RequestContext {
            user: DEFAULT_USER.to_string(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(match user {
            Some(user) => RequestContext { user },
            None => RequestContext::default(),
        })
    }
}
