use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PLACEHOLDER_IMAGE_URL;
use crate::db::PublicStory;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PublicStoryResponse {
    pub id: i64,
    pub title: String,
    pub story: String,
    pub image_urls: Vec<String>,
    pub category: Option<String>,
    pub age_group: Option<String>,
    pub featured: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PublicStory> for PublicStoryResponse {
    fn from(s: PublicStory) -> Self {
        Self {
            id: s.id,
            title: s.title,
            story: s.story_content,
            image_urls: s.image_urls.map(|j| j.0).unwrap_or_default(),
            category: s.category,
            age_group: s.age_group,
            featured: s.featured,
            tags: s.tags.map(|j| j.0).unwrap_or_default(),
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub category: Option<String>,
    pub age_group: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// GET /public-stories
///
/// Unauthenticated gallery; featured stories sort first.
pub async fn list_public_stories(
    State(state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let stories = state
        .db
        .list_public_stories(query.category.as_deref(), query.featured, limit)
        .await?;
    let stories: Vec<PublicStoryResponse> = stories.into_iter().map(Into::into).collect();
    Ok(Json(serde_json::json!({ "stories": stories })))
}

/// POST /admin/publish-story/{id}
///
/// Copies a finished story into the public gallery.
pub async fn publish_story(
    State(state): State<AppState>,
    user: AuthUser,
    Path(story_id): Path<i64>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let story = state
        .db
        .get_story(story_id)
        .await?
        .ok_or(ApiError::NotFound("story"))?;
    if story.title.is_empty() || story.story_content.is_empty() {
        return Err(ApiError::Validation(
            "story has no generated content to publish".to_string(),
        ));
    }

    let public_id = state
        .db
        .publish_story(
            &story,
            request.category.as_deref(),
            request.age_group.as_deref(),
            request.featured,
            &request.tags,
        )
        .await?;

    info!(
        "story {} published as public story {} by user {}",
        story_id, public_id, user.user_id
    );
    Ok(Json(serde_json::json!({
        "public_story_id": public_id,
        "source_story_id": story_id,
    })))
}

/// POST /admin/cleanup-stories
///
/// Removes stuck placeholders and stories whose images never materialized.
pub async fn cleanup_stories(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state
        .db
        .cleanup_invalid_stories(PLACEHOLDER_IMAGE_URL, 30)
        .await?;
    info!("cleanup by user {} removed {} stories", user.user_id, removed);
    Ok(Json(serde_json::json!({ "removed": removed })))
}
