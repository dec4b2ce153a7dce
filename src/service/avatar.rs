//! Avatar pipeline: a vision call describes the uploaded photo, an image
//! call renders the comic-style avatar, a second vision call extracts the
//! visual traits used later for story consistency.

use tracing::{info, warn};

use crate::api::OpenAiClient;
use crate::api::openai::ChatMessage;
use crate::db::Storage;
use crate::error::ApiError;
use crate::storage::S3Client;
use crate::storage::s3::avatar_key;

const DESCRIBE_SYSTEM_PROMPT: &str = "You are a character designer who creates detailed descriptions for comic book \
characters based on reference photos. Focus on distinctive features that would \
make the character recognizable in cartoon/comic form.";

const TRAITS_SYSTEM_PROMPT: &str = "You are a concept artist creating character designs for comic books. \
Analyze artwork and create character specifications.";

const TRAITS_USER_PROMPT: &str = "Describe the visual elements in this image as if creating a character design \
specification for a comic book character. Focus on artistic details like facial \
structure, hair style, clothing, and distinctive features.";

#[derive(Clone)]
pub struct AvatarStudio {
    openai: OpenAiClient,
    db: Storage,
    s3: Option<S3Client>,
}

pub struct FinishedAvatar {
    pub s3_url: String,
    pub visual_traits: String,
}

impl AvatarStudio {
    pub fn new(openai: OpenAiClient, db: Storage, s3: Option<S3Client>) -> Self {
        Self { openai, db, s3 }
    }

    /// Runs the full pipeline for an existing IN_PROGRESS row and flips it
    /// to COMPLETED, or FAILED if anything goes wrong.
    pub async fn process(
        &self,
        avatar_id: i64,
        user_id: i64,
        image_bytes: Vec<u8>,
        avatar_name: &str,
        traits_description: &str,
        request_id: &str,
    ) -> Result<FinishedAvatar, ApiError> {
        match self
            .process_inner(user_id, image_bytes, avatar_name, traits_description, request_id)
            .await
        {
            Ok(finished) => {
                self.db
                    .complete_avatar(
                        avatar_id,
                        &finished.s3_url,
                        traits_description,
                        Some(&finished.visual_traits),
                    )
                    .await?;
                info!("request {}: avatar {} completed", request_id, avatar_id);
                Ok(finished)
            }
            Err(err) => {
                warn!("request {}: avatar {} failed: {}", request_id, avatar_id, err);
                if let Err(db_err) = self.db.fail_avatar(avatar_id).await {
                    warn!(
                        "request {}: could not mark avatar {} failed: {}",
                        request_id, avatar_id, db_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn process_inner(
        &self,
        user_id: i64,
        image_bytes: Vec<u8>,
        avatar_name: &str,
        traits_description: &str,
        request_id: &str,
    ) -> Result<FinishedAvatar, ApiError> {
        let s3 = self.s3.as_ref().ok_or(ApiError::StorageUnavailable)?;

        info!("request {}: describing uploaded photo", request_id);
        let describe_prompt = format!(
            "Analyze this image and create a detailed description for a comic book character \
             named '{}' with personality: {}. Focus on distinctive facial features, hair style, \
             clothing, and any unique characteristics that would make this character recognizable \
             when drawn in cartoon/comic style. Be specific about colors, shapes, and proportions.",
            avatar_name, traits_description
        );
        let character_description = self
            .openai
            .describe_image(DESCRIBE_SYSTEM_PROMPT, &describe_prompt, &image_bytes)
            .await?;

        info!("request {}: rendering comic-style avatar", request_id);
        let style_prompt = avatar_style_prompt(&character_description, avatar_name, traits_description);
        let comic_bytes = self.openai.generate_image(&style_prompt).await?;

        info!("request {}: extracting visual traits", request_id);
        let traits_messages = [
            ChatMessage::system(TRAITS_SYSTEM_PROMPT),
            ChatMessage::user_with_image(TRAITS_USER_PROMPT, &comic_bytes),
        ];
        let visual_traits = self.openai.chat(&traits_messages, 800, 0.1).await?;

        let s3_url = s3
            .put_object(&avatar_key(user_id, request_id), comic_bytes, "image/png")
            .await?;

        Ok(FinishedAvatar {
            s3_url,
            visual_traits,
        })
    }
}

fn avatar_style_prompt(
    character_description: &str,
    avatar_name: &str,
    traits_description: &str,
) -> String {
    format!(
        "Create a cute comic book/cartoon character avatar for a children's story app based on this description:\n\n\
         {character_description}\n\n\
         CHARACTER NAME: {avatar_name}\n\
         PERSONALITY: {traits_description}\n\n\
         STYLE REQUIREMENTS:\n\
         - Cute comic book/cartoon style with vibrant, child-friendly colors and soft pastels\n\
         - Bold, clean outlines and smooth shapes\n\
         - Friendly, approachable appearance suitable for children aged 3-5\n\
         - Single character portrait with a simple, clean background\n\
         - Make it look heroic, kind, and adventure-ready\n\
         - Maintain the key features described above to keep the character recognizable\n\n\
         Transform the described features into a delightful animated character that children would love to see in their stories.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_prompt_carries_name_and_description() {
        let prompt = avatar_style_prompt("short brown hair, round glasses", "Maya", "curious and kind");
        assert!(prompt.contains("CHARACTER NAME: Maya"));
        assert!(prompt.contains("PERSONALITY: curious and kind"));
        assert!(prompt.contains("round glasses"));
    }
}
