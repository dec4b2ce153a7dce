use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{Story, StoryStatus};
use crate::error::ApiError;
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::router::AppState;
use crate::service::FunFact;

fn default_formats() -> Vec<String> {
    vec!["Comic Book".to_string(), "Text Story".to_string()]
}

#[derive(Debug, Deserialize)]
pub struct StoryRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StoryResponse {
    pub story_id: i64,
    pub title: String,
    pub story: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StoryStatusResponse {
    pub story_id: i64,
    pub status: StoryStatus,
    pub title: String,
    pub story: String,
    pub image_urls: Vec<String>,
    pub formats: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Story> for StoryStatusResponse {
    fn from(story: Story) -> Self {
        Self {
            story_id: story.id,
            status: story.status,
            title: story.title.clone(),
            story: story.story_content.clone(),
            image_urls: story.image_urls(),
            formats: story.formats(),
            created_at: story.created_at,
            updated_at: story.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MyStoriesResponse {
    pub stories: Vec<StoryStatusResponse>,
    pub new_stories_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct FunFactsRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct FunFactsResponse {
    pub facts: Vec<FunFact>,
}

/// POST /generateStory
///
/// Accepts anonymous callers; a bearer token attributes the story to the
/// user and unlocks avatar enrichment. The same prompt from the same caller
/// is throttled for a short window to absorb double-submits.
pub async fn generate_story(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Json(request): Json<StoryRequest>,
) -> Result<Json<StoryResponse>, ApiError> {
    let user_id = user.as_ref().map(|u| u.user_id);
    let request_id = Uuid::new_v4().to_string();
    info!(
        "request {}: story generation, prompt: {:.100}",
        request_id, request.prompt
    );

    let throttle_key = format!("{:?}:{}", user_id, request.prompt.trim());
    if state.story_throttle.check_key(&throttle_key).is_err() {
        warn!("request {}: duplicate prompt throttled", request_id);
        return Err(ApiError::DuplicateRequest);
    }

    let story_id = state
        .db
        .create_story_placeholder(&request.prompt, &request_id, user_id)
        .await?;

    let generated = state
        .story
        .generate(story_id, &request.prompt, &request.formats, &request_id, user_id)
        .await?;

    Ok(Json(StoryResponse {
        story_id: generated.story_id,
        title: generated.title,
        story: generated.story,
        image_urls: generated.image_urls,
    }))
}

/// GET /story/{id}/status
///
/// Anonymous stories are world-readable; owned stories only resolve for
/// their owner, and everyone else sees 404.
pub async fn story_status(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(story_id): Path<i64>,
) -> Result<Json<StoryStatusResponse>, ApiError> {
    let story = state
        .db
        .get_story(story_id)
        .await?
        .ok_or(ApiError::NotFound("story"))?;

    if let Some(owner) = story.user_id
        && user.as_ref().map(|u| u.user_id) != Some(owner)
    {
        return Err(ApiError::NotFound("story"));
    }

    Ok(Json(story.into()))
}

/// PUT /story/{id}/viewed
pub async fn mark_story_viewed(
    State(state): State<AppState>,
    user: AuthUser,
    Path(story_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.db.mark_story_viewed(story_id, user.user_id).await? {
        return Err(ApiError::NotFound("story"));
    }
    Ok(Json(serde_json::json!({ "story_id": story_id, "status": "VIEWED" })))
}

/// GET /my-stories
pub async fn my_stories(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MyStoriesResponse>, ApiError> {
    let stories = state.db.list_user_stories(user.user_id).await?;
    let new_stories_count = state.db.count_new_stories(user.user_id).await?;
    Ok(Json(MyStoriesResponse {
        stories: stories.into_iter().map(Into::into).collect(),
        new_stories_count,
    }))
}

/// POST /generateFunFacts
pub async fn generate_fun_facts(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Json(request): Json<FunFactsRequest>,
) -> Result<Json<FunFactsResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let facts = state
        .fun_facts
        .generate(&request.prompt, &request_id, user.map(|u| u.user_id))
        .await?;
    Ok(Json(FunFactsResponse { facts }))
}
