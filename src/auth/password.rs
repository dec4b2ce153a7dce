use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;

use crate::error::ApiError;

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Minimum 8 chars with at least one uppercase, one lowercase and one digit.
pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters long.".to_string(),
        ));
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_upper && has_lower && has_digit) {
        return Err(ApiError::Validation(
            "Password must contain an uppercase letter, a lowercase letter and a digit."
                .to_string(),
        ));
    }
    Ok(())
}

/// Shape check only; deliverability is the mail provider's problem.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = email.len() <= 255
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        });
    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation("Invalid email address.".to_string()))
    }
}

/// Names are echoed into prompts and emails; strip control chars and cap length.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .take(50)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Six decimal digits, leading zeros allowed.
pub fn generate_otp() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_rejects_wrong_password() {
        let hash = hash_password("Str0ngPass").unwrap();
        assert!(verify_password("Str0ngPass", &hash));
        assert!(!verify_password("WrongPass1", &hash));
    }

    #[test]
    fn verify_tolerates_malformed_hash() {
        assert!(!verify_password("whatever", "not-a-phc-string"));
    }

    #[test]
    fn password_strength_rules() {
        assert!(validate_password_strength("Short1A").is_err());
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
        assert!(validate_password_strength("Adequate1").is_ok());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("kid@example.com").is_ok());
        assert!(validate_email("kid@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("kid example@x.com").is_err());
        assert!(validate_email("kid@.com").is_err());
    }

    #[test]
    fn name_sanitization() {
        assert_eq!(sanitize_name("  Maya  "), "Maya");
        assert_eq!(sanitize_name("a\u{0000}b"), "ab");
        assert_eq!(sanitize_name(&"x".repeat(100)).len(), 50);
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..32 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
