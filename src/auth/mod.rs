//! Authentication: JWT issuance, password hashing, OTP login and Google OAuth.

pub mod google;
pub mod handlers;
pub mod jwt;
pub mod password;

pub use jwt::{Claims, issue_token, verify_token};
