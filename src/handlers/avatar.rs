use axum::Json;
use axum::extract::{Multipart, Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MAX_AVATAR_UPLOAD_BYTES;
use crate::db::{Avatar, AvatarStatus};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::router::AppState;

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub id: i64,
    pub avatar_name: String,
    pub traits_description: String,
    pub visual_traits: Option<String>,
    pub s3_image_url: String,
    pub status: AvatarStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Avatar> for AvatarResponse {
    fn from(a: Avatar) -> Self {
        Self {
            id: a.id,
            avatar_name: a.avatar_name,
            traits_description: a.traits_description.unwrap_or_default(),
            visual_traits: a.visual_traits,
            s3_image_url: a.s3_image_url,
            status: a.status,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AvatarUpdateRequest {
    pub avatar_name: Option<String>,
    pub traits_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AsyncAvatarResponse {
    pub avatar_id: i64,
    pub status: AvatarStatus,
    pub message: String,
}

#[derive(Debug)]
struct AvatarUpload {
    avatar_name: String,
    traits_description: String,
    image_bytes: Vec<u8>,
}

fn validate_image_content_type(content_type: &str) -> Result<(), ApiError> {
    if !content_type.starts_with("image/") {
        return Err(ApiError::Validation(
            "uploaded file must be an image".to_string(),
        ));
    }
    Ok(())
}

fn validate_image_size(len: usize) -> Result<(), ApiError> {
    if len == 0 {
        return Err(ApiError::Validation("uploaded image is empty".to_string()));
    }
    if len > MAX_AVATAR_UPLOAD_BYTES {
        return Err(ApiError::Validation(
            "uploaded image exceeds the 10 MB limit".to_string(),
        ));
    }
    Ok(())
}

/// Final assembly of the parsed multipart fields: every field is required
/// and the name must be non-blank after trimming.
fn assemble_upload(
    avatar_name: Option<String>,
    traits_description: Option<String>,
    image_bytes: Option<Vec<u8>>,
) -> Result<AvatarUpload, ApiError> {
    let avatar_name = avatar_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("avatar_name is required".to_string()))?;
    let traits_description = traits_description
        .ok_or_else(|| ApiError::Validation("traits_description is required".to_string()))?;
    let image_bytes =
        image_bytes.ok_or_else(|| ApiError::Validation("image file is required".to_string()))?;

    Ok(AvatarUpload {
        avatar_name,
        traits_description,
        image_bytes,
    })
}

/// Pulls `avatar_name`, `traits_description` and `image` out of the
/// multipart body and enforces the upload constraints.
async fn read_avatar_upload(mut multipart: Multipart) -> Result<AvatarUpload, ApiError> {
    let mut avatar_name = None;
    let mut traits_description = None;
    let mut image_bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("avatar_name") => {
                avatar_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| ApiError::Validation("avatar_name must be text".to_string()))?,
                );
            }
            Some("traits_description") => {
                traits_description = Some(field.text().await.map_err(|_| {
                    ApiError::Validation("traits_description must be text".to_string())
                })?);
            }
            Some("image") => {
                validate_image_content_type(field.content_type().unwrap_or_default())?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::Validation("could not read image data".to_string()))?;
                validate_image_size(bytes.len())?;
                image_bytes = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    assemble_upload(avatar_name, traits_description, image_bytes)
}

/// POST /personalization/avatar
///
/// Synchronous variant: the caller waits for the whole pipeline and gets the
/// finished avatar back.
pub async fn create_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    let upload = read_avatar_upload(multipart).await?;
    let request_id = Uuid::new_v4().to_string();
    info!(
        "request {}: creating avatar '{}' for user {}",
        request_id, upload.avatar_name, user.user_id
    );

    let avatar_id = state
        .db
        .create_avatar(
            user.user_id,
            &upload.avatar_name,
            Some(&upload.traits_description),
            "",
            AvatarStatus::InProgress,
        )
        .await?;

    state
        .avatars
        .process(
            avatar_id,
            user.user_id,
            upload.image_bytes,
            &upload.avatar_name,
            &upload.traits_description,
            &request_id,
        )
        .await?;

    let avatar = state
        .db
        .get_avatar(avatar_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("avatar"))?;
    Ok(Json(avatar.into()))
}

/// POST /personalization/avatar/async
///
/// Returns as soon as the IN_PROGRESS row exists; the pipeline runs in a
/// background task and the client polls the status endpoint.
pub async fn create_avatar_async(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<AsyncAvatarResponse>, ApiError> {
    let upload = read_avatar_upload(multipart).await?;
    let request_id = Uuid::new_v4().to_string();

    let avatar_id = state
        .db
        .create_avatar(
            user.user_id,
            &upload.avatar_name,
            Some(&upload.traits_description),
            "",
            AvatarStatus::InProgress,
        )
        .await?;

    info!(
        "request {}: avatar {} queued for background processing",
        request_id, avatar_id
    );
    let studio = state.avatars.clone();
    let user_id = user.user_id;
    tokio::spawn(async move {
        if let Err(err) = studio
            .process(
                avatar_id,
                user_id,
                upload.image_bytes,
                &upload.avatar_name,
                &upload.traits_description,
                &request_id,
            )
            .await
        {
            warn!(
                "request {}: background avatar {} failed: {}",
                request_id, avatar_id, err
            );
        }
    });

    Ok(Json(AsyncAvatarResponse {
        avatar_id,
        status: AvatarStatus::InProgress,
        message: "Avatar generation started. Poll the status endpoint for the result.".to_string(),
    }))
}

/// GET /personalization/avatar
pub async fn get_avatar(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AvatarResponse>, ApiError> {
    let avatar = state
        .db
        .get_active_avatar(user.user_id)
        .await?
        .ok_or(ApiError::NotFound("avatar"))?;
    Ok(Json(avatar.into()))
}

/// PUT /personalization/avatar
pub async fn update_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AvatarUpdateRequest>,
) -> Result<Json<AvatarResponse>, ApiError> {
    if request.avatar_name.is_none() && request.traits_description.is_none() {
        return Err(ApiError::Validation(
            "provide avatar_name or traits_description to update".to_string(),
        ));
    }

    let avatar = state
        .db
        .get_active_avatar(user.user_id)
        .await?
        .ok_or(ApiError::NotFound("avatar"))?;

    state
        .db
        .update_avatar_details(
            avatar.id,
            request.avatar_name.as_deref(),
            request.traits_description.as_deref(),
        )
        .await?;

    let avatar = state
        .db
        .get_avatar(avatar.id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("avatar"))?;
    Ok(Json(avatar.into()))
}

/// GET /personalization/avatar/status/{id}
pub async fn avatar_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(avatar_id): Path<i64>,
) -> Result<Json<AvatarResponse>, ApiError> {
    let avatar = state
        .db
        .get_avatar(avatar_id, user.user_id)
        .await?
        .ok_or(ApiError::NotFound("avatar"))?;
    Ok(Json(avatar.into()))
}

/// GET /personalization/completed-count
pub async fn completed_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.db.count_completed_avatars(user.user_id).await?;
    Ok(Json(serde_json::json!({ "completed_count": count })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_image_content_type_is_rejected() {
        assert!(validate_image_content_type("image/png").is_ok());
        assert!(validate_image_content_type("image/jpeg").is_ok());
        assert!(matches!(
            validate_image_content_type("application/pdf"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_image_content_type(""),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn image_size_bounds_are_enforced() {
        assert!(validate_image_size(1).is_ok());
        assert!(validate_image_size(MAX_AVATAR_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            validate_image_size(0),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_image_size(MAX_AVATAR_UPLOAD_BYTES + 1),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn every_upload_field_is_required() {
        assert!(matches!(
            assemble_upload(None, Some("brave".into()), Some(vec![1])),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            assemble_upload(Some("Luna".into()), None, Some(vec![1])),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            assemble_upload(Some("Luna".into()), Some("brave".into()), None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn blank_avatar_name_is_rejected() {
        assert!(matches!(
            assemble_upload(Some("   ".into()), Some("brave".into()), Some(vec![1])),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn complete_upload_is_accepted_and_trimmed() {
        let upload =
            assemble_upload(Some("  Luna  ".into()), Some("brave".into()), Some(vec![1, 2]))
                .unwrap();
        assert_eq!(upload.avatar_name, "Luna");
        assert_eq!(upload.traits_description, "brave");
        assert_eq!(upload.image_bytes, vec![1, 2]);
    }
}
