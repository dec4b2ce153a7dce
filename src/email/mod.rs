//! Outbound email via the SES v2 JSON API. When AWS credentials or the
//! sender address are missing the service degrades to log-only delivery so
//! local development never blocks on mail.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::config::CONFIG;
use crate::error::ApiError;
use crate::storage::sigv4;

#[derive(Clone)]
pub struct EmailService {
    ses: Option<SesClient>,
}

#[derive(Clone)]
struct SesClient {
    http: reqwest::Client,
    access_key: String,
    secret_key: String,
    region: String,
    from_email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from_email_address: &'a str,
    destination: Destination<'a>,
    content: Content<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Destination<'a> {
    to_addresses: [&'a str; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Content<'a> {
    simple: SimpleContent<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SimpleContent<'a> {
    subject: Data<'a>,
    body: Body<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Body<'a> {
    html: Data<'a>,
    text: Data<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Data<'a> {
    data: &'a str,
}

impl EmailService {
    pub fn from_config(http: reqwest::Client) -> Self {
        let configured = !CONFIG.aws_access_key_id.is_empty()
            && !CONFIG.aws_secret_access_key.is_empty()
            && !CONFIG.from_email.is_empty();
        if !configured {
            warn!("email delivery not configured; messages will be logged instead");
            return Self { ses: None };
        }
        Self {
            ses: Some(SesClient {
                http,
                access_key: CONFIG.aws_access_key_id.clone(),
                secret_key: CONFIG.aws_secret_access_key.clone(),
                region: CONFIG.aws_region.clone(),
                from_email: CONFIG.from_email.clone(),
            }),
        }
    }

    pub async fn send_otp_email(&self, to: &str, otp: &str) -> Result<(), ApiError> {
        let subject = "Your login code";
        let text = otp_text_body(otp);
        let html = otp_html_body(otp);
        match &self.ses {
            Some(ses) => ses.send(to, subject, &html, &text).await,
            None => {
                info!("[email disabled] OTP for {}: {}", to, otp);
                Ok(())
            }
        }
    }

    pub async fn send_welcome_email(&self, to: &str, first_name: &str) -> Result<(), ApiError> {
        let subject = "Welcome to your story studio!";
        let text = welcome_text_body(first_name);
        let html = welcome_html_body(first_name);
        match &self.ses {
            Some(ses) => ses.send(to, subject, &html, &text).await,
            None => {
                info!("[email disabled] welcome email for {}", to);
                Ok(())
            }
        }
    }
}

impl SesClient {
    async fn send(&self, to: &str, subject: &str, html: &str, text: &str) -> Result<(), ApiError> {
        let endpoint = format!("https://email.{}.amazonaws.com/v2/email/outbound-emails", self.region);
        let url = Url::parse(&endpoint)?;

        let request = SendEmailRequest {
            from_email_address: &self.from_email,
            destination: Destination { to_addresses: [to] },
            content: Content {
                simple: SimpleContent {
                    subject: Data { data: subject },
                    body: Body {
                        html: Data { data: html },
                        text: Data { data: text },
                    },
                },
            },
        };
        let payload = serde_json::to_vec(&request)?;

        let signed = sigv4::sign(
            &self.access_key,
            &self.secret_key,
            &self.region,
            "ses",
            "POST",
            &url,
            &[("content-type", "application/json")],
            &payload,
            Utc::now(),
        );

        let response = self
            .http
            .post(url)
            .header("authorization", &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Email(format!("SES returned {}: {}", status, body)));
        }
        info!("email sent to {}", to);
        Ok(())
    }
}

fn otp_text_body(otp: &str) -> String {
    format!(
        "Your one-time login code is {}.\n\nIt expires in 5 minutes. If you didn't request it, you can ignore this email.",
        otp
    )
}

fn otp_html_body(otp: &str) -> String {
    format!(
        "<html><body style=\"font-family: sans-serif;\">\
         <h2>Your login code</h2>\
         <p style=\"font-size: 28px; letter-spacing: 4px;\"><strong>{}</strong></p>\
         <p>This code expires in 5 minutes. If you didn't request it, you can ignore this email.</p>\
         </body></html>",
        otp
    )
}

fn welcome_text_body(first_name: &str) -> String {
    let name = if first_name.is_empty() { "there" } else { first_name };
    format!(
        "Hi {},\n\nWelcome! Your account is ready. Head back to the app to create your first story.",
        name
    )
}

fn welcome_html_body(first_name: &str) -> String {
    let name = if first_name.is_empty() { "there" } else { first_name };
    format!(
        "<html><body style=\"font-family: sans-serif;\">\
         <h2>Hi {},</h2>\
         <p>Welcome! Your account is ready. Head back to the app to create your first story.</p>\
         </body></html>",
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_bodies_contain_the_code() {
        assert!(otp_text_body("123456").contains("123456"));
        assert!(otp_html_body("123456").contains("123456"));
    }

    #[test]
    fn welcome_body_falls_back_without_a_name() {
        assert!(welcome_text_body("").contains("Hi there"));
        assert!(welcome_html_body("Maya").contains("Maya"));
    }

    #[test]
    fn ses_payload_uses_pascal_case_fields() {
        let request = SendEmailRequest {
            from_email_address: "noreply@example.com",
            destination: Destination {
                to_addresses: ["kid@example.com"],
            },
            content: Content {
                simple: SimpleContent {
                    subject: Data { data: "hello" },
                    body: Body {
                        html: Data { data: "<p>hi</p>" },
                        text: Data { data: "hi" },
                    },
                },
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["FromEmailAddress"], "noreply@example.com");
        assert_eq!(json["Destination"]["ToAddresses"][0], "kid@example.com");
        assert_eq!(json["Content"]["Simple"]["Subject"]["Data"], "hello");
    }
}
