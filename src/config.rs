use figment::{Figment, providers::Env};
use serde::Deserialize;
use std::sync::LazyLock;
use url::Url;

/// Runtime configuration, read once from the process environment.
///
/// Every field has a default so the service can boot (and the test suite can
/// run) without a fully provisioned environment; missing vendor credentials
/// disable the corresponding integration at runtime instead of aborting.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret_key: String,
    #[serde(default)]
    pub aws_access_key_id: String,
    #[serde(default)]
    pub aws_secret_access_key: String,
    #[serde(default = "default_aws_region")]
    pub aws_region: String,
    #[serde(default = "default_s3_bucket")]
    pub s3_bucket: String,
    #[serde(default)]
    pub google_client_id: String,
    #[serde(default)]
    pub google_client_secret: String,
    #[serde(default = "default_google_redirect_uri")]
    pub google_redirect_uri: String,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default)]
    pub from_email: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
}

fn default_database_url() -> String {
    "mysql://root@127.0.0.1:3306/storyloom".to_string()
}

fn default_jwt_secret() -> String {
    "change-this-jwt-secret-in-production".to_string()
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

fn default_s3_bucket() -> String {
    "storyloom-assets".to_string()
}

fn default_google_redirect_uri() -> String {
    "http://127.0.0.1:8000/auth/google/callback".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Figment::new()
        .merge(Env::raw())
        .extract()
        .expect("FATAL: failed to read configuration from environment")
});

// OpenAI endpoints and model selection.
pub static OPENAI_CHAT_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://api.openai.com/v1/chat/completions").expect("static URL")
});
pub static OPENAI_IMAGE_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://api.openai.com/v1/images/generations").expect("static URL"));
pub const OPENAI_CHAT_MODEL: &str = "gpt-4o";
pub const OPENAI_IMAGE_MODEL: &str = "gpt-image-1";

// Google OAuth endpoints.
pub static GOOGLE_AUTH_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://accounts.google.com/o/oauth2/v2/auth").expect("static URL")
});
pub static GOOGLE_TOKEN_URI: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://oauth2.googleapis.com/token").expect("static URL"));
pub static GOOGLE_USERINFO_URI: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://www.googleapis.com/oauth2/v2/userinfo").expect("static URL")
});

/// Placeholder shown to clients when an image could not be produced or stored.
pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://via.placeholder.com/400x300?text=Image+Unavailable";

/// Upper bound for avatar uploads, in bytes.
pub const MAX_AVATAR_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Seconds a user must wait before resubmitting the same story prompt.
pub const STORY_DUPLICATE_WINDOW_SECS: u64 = 10;
