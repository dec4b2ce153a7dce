use axum::Json;
use axum::extract::State;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::jwt::{TOKEN_TTL_DAYS, issue_token};
use crate::auth::password::{
    generate_otp, hash_password, sanitize_name, validate_email, validate_password_strength,
    verify_password,
};
use crate::db::{AuthType, User};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub auth_type: AuthType,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            auth_type: u.auth_type,
            is_verified: u.is_verified,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn open_session(state: &AppState, user: &User) -> Result<TokenResponse, ApiError> {
    let token = issue_token(user.id, &user.email, user.auth_type)?;
    let expires_at = Utc::now() + Duration::days(TOKEN_TTL_DAYS);
    state
        .db
        .create_session(user.id, &token, expires_at, None, None)
        .await?;
    state.db.update_last_login(user.id).await?;
    Ok(TokenResponse {
        access_token: token,
        token_type: "bearer",
        user: user.clone().into(),
    })
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate_email(&req.email)?;
    validate_password_strength(&req.password)?;

    if state.db.get_user_by_email(&req.email).await?.is_some() {
        return Err(ApiError::Validation(
            "An account with this email already exists.".to_string(),
        ));
    }

    let hash = hash_password(&req.password)?;
    let first_name = sanitize_name(&req.first_name);
    let last_name = sanitize_name(&req.last_name);
    let user_id = state
        .db
        .create_user(
            &req.email,
            Some(&hash),
            &first_name,
            &last_name,
            AuthType::EmailPassword,
            None,
            false,
        )
        .await?;

    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if let Err(e) = state.email.send_welcome_email(&user.email, &first_name).await {
        warn!("welcome email to {} not sent: {}", user.email, e);
    }

    info!("new account registered: user_id={}", user_id);
    Ok(Json(open_session(&state, &user).await?))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let ok = user
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(&req.password, hash));
    if !ok {
        return Err(ApiError::Unauthorized);
    }

    Ok(Json(open_session(&state, &user).await?))
}

/// POST /auth/send-otp
///
/// Always answers with the same generic message so the endpoint cannot be
/// used to probe which addresses have accounts.
pub async fn send_otp(
    State(state): State<AppState>,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_email(&req.email)?;

    let otp = generate_otp();
    state.db.store_otp(&req.email, &otp).await?;
    if let Err(e) = state.email.send_otp_email(&req.email, &otp).await {
        warn!("OTP email to {} not sent: {}", req.email, e);
    }

    Ok(Json(MessageResponse {
        message: "If the address is valid, a login code is on its way.".to_string(),
    }))
}

/// POST /auth/verify-otp
///
/// A correct code signs the caller in, creating the account on first use.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate_email(&req.email)?;

    if !state.db.verify_otp(&req.email, &req.otp).await? {
        return Err(ApiError::Unauthorized);
    }

    let user = match state.db.get_user_by_email(&req.email).await? {
        Some(user) => {
            if !user.is_verified {
                state.db.mark_user_verified(user.id).await?;
            }
            user
        }
        None => {
            // First login via OTP creates the account; fall back to the
            // mailbox name when the client sent no first name.
            let first_name = if req.first_name.trim().is_empty() {
                req.email.split('@').next().unwrap_or_default().to_string()
            } else {
                req.first_name.clone()
            };
            let user_id = state
                .db
                .create_user(
                    &req.email,
                    None,
                    &sanitize_name(&first_name),
                    &sanitize_name(&req.last_name),
                    AuthType::Otp,
                    None,
                    true,
                )
                .await?;
            state
                .db
                .get_user_by_id(user_id)
                .await?
                .ok_or(ApiError::NotFound("user"))?
        }
    };

    Ok(Json(open_session(&state, &user).await?))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    _user: AuthUser,
    TypedHeader(authorization): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.db.invalidate_session(authorization.token()).await?;
    Ok(Json(MessageResponse {
        message: "Logged out.".to_string(),
    }))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_id(user.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user.into()))
}

/// DELETE /auth/account
pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.db.deactivate_user(user.user_id).await?;
    info!("account deactivated: user_id={}", user.user_id);
    Ok(Json(MessageResponse {
        message: "Account deleted.".to_string(),
    }))
}
