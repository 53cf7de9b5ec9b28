// Session extractor - resolves the bearer token into an explicit SessionContext per request

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use crate::error::AppError;
use crate::infrastructure::identity::{IdentityService, SessionContext};

/// Application state that can resolve session tokens
pub trait HasIdentity {
    fn identity(&self) -> &Arc<IdentityService>;
}

/// Required session; rejects the request with 401 when absent or invalid
#[derive(Debug, Clone)]
pub struct Session(pub SessionContext);

impl std::ops::Deref for Session {
    type Target = SessionContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Optional session; a missing header yields `None`, a bad token is still rejected
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<SessionContext>);

pub(crate) fn bearer_token(parts: &Parts) -> Result<Option<String>, AppError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?;
    Ok(Some(token.trim().to_string()))
}

impl<S> FromRequestParts<S> for Session
where
    S: HasIdentity + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("로그인이 필요합니다.".to_string()))?;
        let identity = state.identity().clone();
        identity.validate_token(&token).await.map(Session)
    }
}

impl<S> FromRequestParts<S> for MaybeSession
where
    S: HasIdentity + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts)? else {
            return Ok(MaybeSession(None));
        };
        let identity = state.identity().clone();
        identity
            .validate_token(&token)
            .await
            .map(|session| MaybeSession(Some(session)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(None)).unwrap(), None);
        assert_eq!(
            bearer_token(&parts_with(Some("Bearer abc.def"))).unwrap(),
            Some("abc.def".to_string())
        );
        assert!(bearer_token(&parts_with(Some("Basic xyz"))).is_err());
    }
}
