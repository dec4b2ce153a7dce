use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ApiError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("duplicate request; try again shortly")]
    DuplicateRequest,

    #[error("OAuth flow error: {0}")]
    OauthFlow(String),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OpenAI API error ({status}): {message}")]
    OpenAi { status: StatusCode, message: String },

    #[error("OpenAI returned an empty or malformed response")]
    EmptyCompletion,

    #[error("image storage is not configured")]
    StorageUnavailable,

    #[error("S3 upload failed ({status}): {message}")]
    S3Upload { status: StatusCode, message: String },

    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("password hashing error")]
    PasswordHash,
}

impl From<argon2::password_hash::Error> for ApiError {
    fn from(_: argon2::password_hash::Error) -> Self {
        ApiError::PasswordHash
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for ApiError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => {
                ApiError::Oauth2Token(err.error().to_string())
            }
            RequestTokenError::Request(req_e) => {
                ApiError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => ApiError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => ApiError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "BAD_REQUEST".to_string(),
                    message: msg,
                },
            ),
            ApiError::Unauthorized | ApiError::Oauth2Token(_) => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Authentication required or token invalid.".to_string(),
                },
            ),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", what),
                },
            ),
            ApiError::DuplicateRequest => (
                StatusCode::TOO_MANY_REQUESTS,
                ApiErrorBody {
                    code: "DUPLICATE_REQUEST".to_string(),
                    message: "Please wait a moment before submitting the same prompt again."
                        .to_string(),
                },
            ),
            ApiError::OauthFlow(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "OAUTH_FLOW".to_string(),
                    message: msg,
                },
            ),
            ApiError::OpenAi { status, message } => {
                // 4xx from the vendor is the caller's problem; everything else
                // surfaces as a bad gateway.
                let status = if status.is_client_error() {
                    status
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (
                    status,
                    ApiErrorBody {
                        code: "OPENAI_ERROR".to_string(),
                        message,
                    },
                )
            }
            ApiError::EmptyCompletion => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "OPENAI_ERROR".to_string(),
                    message: "The language model returned no usable content.".to_string(),
                },
            ),
            ApiError::Reqwest(_) | ApiError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                },
            ),
            ApiError::StorageUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorBody {
                    code: "STORAGE_UNAVAILABLE".to_string(),
                    message: "Image storage is not configured.".to_string(),
                },
            ),
            ApiError::S3Upload { message, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "S3_ERROR".to_string(),
                    message,
                },
            ),
            ApiError::Email(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "EMAIL_ERROR".to_string(),
                    message: "Failed to deliver email.".to_string(),
                },
            ),
            ApiError::Database(_) | ApiError::Json(_) | ApiError::PasswordHash => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// OpenAI error envelope, decoded from non-2xx vendor responses.
#[derive(Deserialize, Debug)]
pub struct OpenAiErrorEnvelope {
    pub error: OpenAiErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct OpenAiErrorBody {
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
