use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::CONFIG;
use crate::db::AuthType;
use crate::error::ApiError;

/// Bearer tokens stay valid for 30 days; the session table can cut them
/// short on logout or account deletion.
pub const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub auth_type: AuthType,
    pub exp: i64,
}

pub fn issue_token(user_id: i64, email: &str, auth_type: AuthType) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        auth_type,
        exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(CONFIG.jwt_secret_key.as_bytes()),
    )
    .map_err(|_| ApiError::Unauthorized)
}

pub fn verify_token(token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(CONFIG.jwt_secret_key.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip_preserves_claims() {
        let token = issue_token(42, "kid@example.com", AuthType::EmailPassword).unwrap();
        let claims = verify_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "kid@example.com");
        assert_eq!(claims.auth_type, AuthType::EmailPassword);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify_token("not.a.jwt").is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = issue_token(1, "a@b.c", AuthType::Otp).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push('x');
        assert!(verify_token(&tampered).is_err());
    }
}
