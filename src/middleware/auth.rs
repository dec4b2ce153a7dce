use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use tracing::warn;

use crate::auth::jwt::{Claims, verify_token};
use crate::db::AuthType;
use crate::error::ApiError;
use crate::router::AppState;

/// Bearer-token guard. A request passes only when the `Authorization`
/// header carries a valid, unexpired JWT that still has an active row in
/// the session table, so logout and account deletion revoke it immediately.
/// The session lookup fails closed: if it cannot be answered, the token is
/// rejected.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub auth_type: AuthType,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            auth_type: claims.auth_type,
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get("authorization")?.to_str().ok()?.trim();
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
}

async fn session_backed_claims(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    let claims = verify_token(token)?;
    let active = state.db.session_is_active(token).await.map_err(|e| {
        warn!("session lookup failed, rejecting token: {}", e);
        ApiError::Unauthorized
    })?;
    if !active {
        return Err(ApiError::Unauthorized);
    }
    Ok(claims)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let state = AppState::from_ref(state);
        let claims = session_backed_claims(&state, token).await?;
        Ok(claims.into())
    }
}

/// Like [`AuthUser`] but never rejects: endpoints that serve both anonymous
/// and signed-in callers get `None` instead of a 401. A token that is
/// invalid or no longer backed by a session is treated the same as no token.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(MaybeAuthUser(None));
        };
        let state = AppState::from_ref(state);
        let user = session_backed_claims(&state, token)
            .await
            .ok()
            .map(AuthUser::from);
        Ok(MaybeAuthUser(user))
    }
}
