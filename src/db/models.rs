use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// How a user account was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    EmailPassword,
    Otp,
    Google,
}

/// Story lifecycle: placeholder -> generated -> read by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    InProgress,
    New,
    Viewed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvatarStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub auth_type: AuthType,
    pub google_id: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub story_content: String,
    pub prompt: Option<String>,
    pub image_urls: Option<Json<Vec<String>>>,
    pub formats: Option<Json<Vec<String>>>,
    pub request_id: Option<String>,
    pub user_id: Option<i64>,
    pub status: StoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Story {
    pub fn image_urls(&self) -> Vec<String> {
        self.image_urls.as_ref().map(|j| j.0.clone()).unwrap_or_default()
    }

    pub fn formats(&self) -> Vec<String> {
        self.formats.as_ref().map(|j| j.0.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Avatar {
    pub id: i64,
    pub user_id: i64,
    pub avatar_name: String,
    pub traits_description: Option<String>,
    pub visual_traits: Option<String>,
    pub s3_image_url: String,
    pub status: AvatarStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PublicStory {
    pub id: i64,
    pub title: String,
    pub story_content: String,
    pub prompt: Option<String>,
    pub image_urls: Option<Json<Vec<String>>>,
    pub formats: Option<Json<Vec<String>>>,
    pub category: Option<String>,
    pub age_group: Option<String>,
    pub featured: bool,
    pub tags: Option<Json<Vec<String>>>,
    pub created_at: DateTime<Utc>,
}
