//! Bearer-token extractors for axum handlers.

use crate::api::rest::ApiError;
use crate::error::Error;
use crate::security::{Role, SecurityService};
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::sync::Arc;

/// Caller identity taken from a valid JWT in the `Authorization` header
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
    pub name: String,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<SecurityService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Authentication("Missing Authorization header".to_string()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            Error::Authentication("Expected: Bearer <token>".to_string())
        })?;

        let security = <Arc<SecurityService> as FromRef<S>>::from_ref(state);
        let claims = security.validate_token(token)?.claims;
        let role = claims.role()?;

        Ok(AuthUser {
            subject: claims.sub,
            name: claims.name,
            role,
        })
    }
}

async fn require<S>(parts: &mut Parts, state: &S, role: Role) -> Result<AuthUser, ApiError>
where
    Arc<SecurityService>: FromRef<S>,
    S: Send + Sync,
{
    let user = AuthUser::from_request_parts(parts, state).await?;
    if user.role < role {
        return Err(Error::Authorization(format!("{} role required", role)).into());
    }
    Ok(user)
}

/// Admin or above
pub struct RequireAdmin(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    Arc<SecurityService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequireAdmin(require(parts, state, Role::Admin).await?))
    }
}

/// Super admin only
pub struct RequireSuperAdmin(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireSuperAdmin
where
    Arc<SecurityService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequireSuperAdmin(require(parts, state, Role::SuperAdmin).await?))
    }
}
