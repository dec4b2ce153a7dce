//! Thin OpenAI client: chat completions (text and vision) and image
//! generation. No retries; the caller decides what a failure means.

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{OPENAI_CHAT_MODEL, OPENAI_CHAT_URL, OPENAI_IMAGE_MODEL, OPENAI_IMAGE_URL};
use crate::error::{ApiError, OpenAiErrorEnvelope};

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: ChatContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ChatPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlPart },
}

#[derive(Debug, Serialize)]
pub struct ImageUrlPart {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: ChatContent::Text(text.into()),
        }
    }

    /// User message carrying a prompt plus an inline image as a data URL.
    pub fn user_with_image(text: impl Into<String>, image_bytes: &[u8]) -> Self {
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(image_bytes));
        Self {
            role: "user",
            content: ChatContent::Parts(vec![
                ChatPart::Text { text: text.into() },
                ChatPart::ImageUrl {
                    image_url: ImageUrlPart { url: data_url },
                },
            ]),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'static str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'static str,
    prompt: &'a str,
    n: u32,
    size: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    /// One chat-completion round trip; returns the assistant text.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ApiError> {
        let request = ChatRequest {
            model: OPENAI_CHAT_MODEL,
            messages,
            max_tokens,
            temperature,
        };

        let response = self
            .http
            .post(OPENAI_CHAT_URL.as_str())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ApiError::EmptyCompletion)?;
        debug!("chat completion returned {} chars", content.len());
        Ok(content)
    }

    /// Vision call: describes `image_bytes` under the given instructions.
    pub async fn describe_image(
        &self,
        system: &str,
        prompt: &str,
        image_bytes: &[u8],
    ) -> Result<String, ApiError> {
        let messages = [
            ChatMessage::system(system),
            ChatMessage::user_with_image(prompt, image_bytes),
        ];
        self.chat(&messages, 1000, 0.5).await
    }

    /// Generates one PNG and returns the raw bytes.
    pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ApiError> {
        let request = ImageRequest {
            model: OPENAI_IMAGE_MODEL,
            prompt,
            n: 1,
            size: "1024x1024",
        };

        let response = self
            .http
            .post(OPENAI_IMAGE_URL.as_str())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let parsed: ImageResponse = response.json().await?;
        let b64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or(ApiError::EmptyCompletion)?;
        BASE64
            .decode(b64.as_bytes())
            .map_err(|_| ApiError::EmptyCompletion)
    }

    /// Maps non-2xx vendor responses onto [`ApiError::OpenAi`], keeping the
    /// vendor's own message when the error envelope parses.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OpenAiErrorEnvelope>(&body)
            .map(|env| env.error.message)
            .unwrap_or(body);
        Err(ApiError::OpenAi {
            status: StatusCode::from_u16(status.as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multimodal_message_serializes_to_openai_shape() {
        let msg = ChatMessage::user_with_image("describe this", b"\x89PNG");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        let url = json["content"][1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn plain_message_serializes_content_as_string() {
        let msg = ChatMessage::system("you are a storyteller");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "you are a storyteller");
    }
}
