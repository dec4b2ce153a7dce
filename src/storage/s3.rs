use axum::http::StatusCode;
use chrono::Utc;
use tracing::info;
use url::Url;

use crate::config::CONFIG;
use crate::error::ApiError;
use crate::storage::sigv4;

/// Uploads PNGs to S3 with SigV4-signed PUTs. Constructed only when AWS
/// credentials are configured; callers hold an `Option<S3Client>` and treat
/// `None` as storage-disabled.
#[derive(Clone)]
pub struct S3Client {
    http: reqwest::Client,
    access_key: String,
    secret_key: String,
    region: String,
    bucket: String,
}

impl S3Client {
    pub fn from_config(http: reqwest::Client) -> Option<Self> {
        if CONFIG.aws_access_key_id.is_empty() || CONFIG.aws_secret_access_key.is_empty() {
            return None;
        }
        Some(Self {
            http,
            access_key: CONFIG.aws_access_key_id.clone(),
            secret_key: CONFIG.aws_secret_access_key.clone(),
            region: CONFIG.aws_region.clone(),
            bucket: CONFIG.s3_bucket.clone(),
        })
    }

    /// PUTs the object and returns its public URL.
    pub async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ApiError> {
        let endpoint = format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        );
        let url = Url::parse(&endpoint)?;

        let signed = sigv4::sign(
            &self.access_key,
            &self.secret_key,
            &self.region,
            "s3",
            "PUT",
            &url,
            &[("content-type", content_type)],
            &bytes,
            Utc::now(),
        );

        let response = self
            .http
            .put(url)
            .header("authorization", &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::S3Upload {
                status: StatusCode::from_u16(status.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                message,
            });
        }

        info!("uploaded s3://{}/{}", self.bucket, key);
        Ok(public_url(&self.bucket, key))
    }
}

pub fn public_url(bucket: &str, key: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", bucket, key)
}

pub fn story_image_key(request_id: &str, index: usize) -> String {
    format!("stories/{}_image_{}.png", request_id, index)
}

pub fn avatar_key(user_id: i64, request_id: &str) -> String {
    format!("avatars/user_{}_{}.png", user_id, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_and_public_urls() {
        assert_eq!(story_image_key("req-1", 2), "stories/req-1_image_2.png");
        assert_eq!(avatar_key(7, "req-2"), "avatars/user_7_req-2.png");
        assert_eq!(
            public_url("my-bucket", "stories/a.png"),
            "https://my-bucket.s3.amazonaws.com/stories/a.png"
        );
    }
}
