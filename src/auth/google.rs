//! Browser-facing Google sign-in, carried through a PKCE + CSRF cookie pair.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenResponse,
};
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use time::Duration;
use tracing::{info, warn};

use crate::auth::jwt::{TOKEN_TTL_DAYS, issue_token};
use crate::auth::password::sanitize_name;
use crate::config::{CONFIG, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URI, GOOGLE_USERINFO_URI};
use crate::db::AuthType;
use crate::error::ApiError;
use crate::router::AppState;

const CSRF_COOKIE: &str = "oauth_csrf_token";
const PKCE_COOKIE: &str = "oauth_pkce_verifier";

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserinfo {
    id: String,
    email: String,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    #[serde(default)]
    verified_email: bool,
}

type GoogleOauth2Client = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

fn build_oauth2_client() -> Result<GoogleOauth2Client, ApiError> {
    let client = OAuth2Client::new(ClientId::new(CONFIG.google_client_id.clone()))
        .set_client_secret(ClientSecret::new(CONFIG.google_client_secret.clone()))
        .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.as_str().to_string())?)
        .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URI.as_str().to_string())?)
        .set_redirect_uri(RedirectUrl::new(CONFIG.google_redirect_uri.clone())?);
    Ok(client)
}

/// GET /auth/google -> redirects to Google's consent page.
pub async fn google_oauth_entry(jar: PrivateCookieJar) -> Result<impl IntoResponse, ApiError> {
    let client = build_oauth2_client()?;

    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new("openid".to_string()))
        .add_scope(Scope::new("email".to_string()))
        .add_scope(Scope::new("profile".to_string()))
        .set_pkce_challenge(challenge)
        .url();

    let jar = store_oauth_cookies(jar, &csrf_token, verifier.secret());

    info!("Dispatching OAuth redirect");
    Ok((jar, Redirect::temporary(auth_url.as_ref())).into_response())
}

/// GET /auth/google/callback -> exchanges the code, resolves the account and
/// sends the browser back to the frontend with a bearer token.
pub async fn google_oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    let (pkce_verifier, csrf_cookie, jar) = match load_oauth_session(jar) {
        Ok(data) => data,
        Err((jar, err)) => return respond_with_error(jar, err),
    };

    let state_param = match query.state.as_deref() {
        Some(s) => s,
        None => {
            return respond_with_error(
                jar,
                ApiError::OauthFlow("missing `state` in callback".to_string()),
            );
        }
    };
    if state_param != csrf_cookie {
        return respond_with_error(jar, ApiError::OauthFlow("CSRF token mismatch".to_string()));
    }

    let code = match query.code.as_deref() {
        Some(code) => code,
        None => {
            return respond_with_error(
                jar,
                ApiError::OauthFlow("missing `code` in callback".to_string()),
            );
        }
    };

    match complete_sign_in(&state, code, pkce_verifier).await {
        Ok(token) => {
            let target = format!("{}/auth/success?token={}", CONFIG.frontend_url, token);
            (jar, Redirect::temporary(&target)).into_response()
        }
        Err(err) => respond_with_error(jar, err),
    }
}

async fn complete_sign_in(
    state: &AppState,
    code: &str,
    pkce_verifier: String,
) -> Result<String, ApiError> {
    let client = build_oauth2_client()?;
    let token_response = client
        .exchange_code(AuthorizationCode::new(code.to_owned()))
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&state.http)
        .await?;

    let userinfo: GoogleUserinfo = state
        .http
        .get(GOOGLE_USERINFO_URI.as_str())
        .bearer_auth(token_response.access_token().secret())
        .header("Accept", "application/json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let user = resolve_account(state, &userinfo).await?;

    let token = issue_token(user.id, &user.email, user.auth_type)?;
    let expires_at = chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS);
    state
        .db
        .create_session(user.id, &token, expires_at, None, None)
        .await?;
    state.db.update_last_login(user.id).await?;

    info!("Google sign-in completed: user_id={}", user.id);
    Ok(token)
}

/// Resolution order: existing Google identity, then an existing account with
/// the same address (which gets the identity linked), then a fresh account.
async fn resolve_account(
    state: &AppState,
    userinfo: &GoogleUserinfo,
) -> Result<crate::db::User, ApiError> {
    if let Some(user) = state.db.get_user_by_google_id(&userinfo.id).await? {
        return Ok(user);
    }

    if let Some(user) = state.db.get_user_by_email(&userinfo.email).await? {
        state.db.link_google_account(user.id, &userinfo.id).await?;
        info!("linked Google identity to user_id={}", user.id);
        return state
            .db
            .get_user_by_id(user.id)
            .await?
            .ok_or(ApiError::NotFound("user"));
    }

    let user_id = state
        .db
        .create_user(
            &userinfo.email,
            None,
            &sanitize_name(&userinfo.given_name),
            &sanitize_name(&userinfo.family_name),
            AuthType::Google,
            Some(&userinfo.id),
            userinfo.verified_email,
        )
        .await?;
    state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))
}

fn store_oauth_cookies(jar: PrivateCookieJar, csrf: &CsrfToken, pkce_verifier: &str) -> PrivateCookieJar {
    jar.add(build_cookie(CSRF_COOKIE, csrf.secret().to_string()))
        .add(build_cookie(PKCE_COOKIE, pkce_verifier.to_string()))
}

fn load_oauth_session(
    jar: PrivateCookieJar,
) -> Result<(String, String, PrivateCookieJar), (PrivateCookieJar, ApiError)> {
    let Some(csrf_cookie) = jar.get(CSRF_COOKIE).map(|c| c.value().to_owned()) else {
        let jar = clear_oauth_cookies(jar);
        return Err((
            jar,
            ApiError::OauthFlow("Missing CSRF token in cookie".to_string()),
        ));
    };

    let Some(pkce_cookie) = jar.get(PKCE_COOKIE).map(|c| c.value().to_owned()) else {
        let jar = clear_oauth_cookies(jar);
        return Err((
            jar,
            ApiError::OauthFlow("Missing PKCE verifier in cookie".to_string()),
        ));
    };

    let jar = clear_oauth_cookies(jar);

    Ok((pkce_cookie, csrf_cookie, jar))
}

fn clear_oauth_cookies(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(clear_cookie(CSRF_COOKIE))
        .remove(clear_cookie(PKCE_COOKIE))
}

fn build_cookie(name: &str, value: String) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}

fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn respond_with_error(jar: PrivateCookieJar, err: ApiError) -> Response {
    warn!("Google sign-in failed: {}", err);
    (jar, err.into_response()).into_response()
}
