//! Story generation: one chat call for the text, one for the comic
//! breakdown, one for the consistency guide, then four page images
//! generated concurrently. Image failures degrade to placeholder URLs
//! instead of failing the story.

use futures::future::join_all;
use tracing::{info, warn};

use crate::api::OpenAiClient;
use crate::api::openai::ChatMessage;
use crate::config::PLACEHOLDER_IMAGE_URL;
use crate::db::Storage;
use crate::error::ApiError;
use crate::storage::S3Client;
use crate::storage::s3::story_image_key;

pub const STORY_FOOTER: &str = "The End! (Created By - StoryLoom)";
const COMIC_FORMAT: &str = "Comic Book";
const COMIC_PAGES: usize = 4;
const FALLBACK_TITLE: &str = "A Magical Story";
const PART_BREAK: &str = "---PART BREAK---";

const STORY_SYSTEM_PROMPT: &str = "You are a friendly and imaginative storyteller who creates elaborate, exciting, \
and engaging stories for children aged 3 to 5 years. \
Use simple words that a 3-5 year old can understand. \
Keep sentences short and clear but create an exciting narrative arc. \
Include characters that go on adventures, face challenges, and discover wonderful things. \
If the story is based on a concept (like kindness, sharing, or friendship), \
weave it into an exciting adventure story, not like a lesson. \
Make the story fun and interesting, with animals, toys, magical creatures, or fantasy elements. \
The story should be approximately 200-250 words and feel like an exciting adventure \
meant to be read aloud to young children. \
Always end the story with 'The End! (Created By - StoryLoom)' on a new line. \
Format your response exactly like this:\n\
Title: [Your Title]\n\n\
[Story content with multiple paragraphs]\n\n\
The End! (Created By - StoryLoom)\n\n\
Use double line breaks between paragraphs. Create 8-12 paragraphs to tell the full adventure.";

const DEFAULT_USER_PROMPT: &str = "Create a delightful story for young children";

const BREAKDOWN_SYSTEM_PROMPT: &str = "You are an expert in comic storytelling and visual narrative structure. \
Break down the given story into exactly 4 meaningful parts for a 4-panel comic series, \
following classic structure: setup, development, climax, resolution. \
Format your response as exactly 4 parts separated by '---PART BREAK---'. \
Each part should be visually interesting, preserve the story's key plot points, \
and keep the language appropriate for children aged 3-5.";

const CONSISTENCY_SYSTEM_PROMPT: &str = "You are an expert comic book artist specializing in character consistency. \
Create a comprehensive visual style guide that ensures perfect consistency across multiple comic panels. \
If character references are provided, use them exactly as the definitive character descriptions. \
Focus on identical character appearances, color palettes, and art style throughout all panels.";

#[derive(Debug)]
pub struct GeneratedStory {
    pub story_id: i64,
    pub title: String,
    pub story: String,
    pub image_urls: Vec<String>,
}

#[derive(Clone)]
pub struct StoryGenerator {
    openai: OpenAiClient,
    db: Storage,
    s3: Option<S3Client>,
}

impl StoryGenerator {
    pub fn new(openai: OpenAiClient, db: Storage, s3: Option<S3Client>) -> Self {
        Self { openai, db, s3 }
    }

    /// Runs the whole pipeline against an already-created placeholder row.
    /// On failure the row is filled with an apology so it never stays stuck
    /// in IN_PROGRESS.
    pub async fn generate(
        &self,
        story_id: i64,
        prompt: &str,
        formats: &[String],
        request_id: &str,
        user_id: Option<i64>,
    ) -> Result<GeneratedStory, ApiError> {
        match self
            .generate_inner(story_id, prompt, formats, request_id, user_id)
            .await
        {
            Ok(story) => Ok(story),
            Err(err) => {
                warn!("request {}: story generation failed: {}", request_id, err);
                if let Err(db_err) = self
                    .db
                    .finalize_story(
                        story_id,
                        "Story Generation Failed",
                        "We encountered an error while generating your story. Please try again.",
                        &[],
                        formats,
                    )
                    .await
                {
                    warn!("request {}: failed to record story failure: {}", request_id, db_err);
                }
                Err(err)
            }
        }
    }

    async fn generate_inner(
        &self,
        story_id: i64,
        prompt: &str,
        formats: &[String],
        request_id: &str,
        user_id: Option<i64>,
    ) -> Result<GeneratedStory, ApiError> {
        let enriched_prompt = self.enrich_with_avatar(prompt, user_id).await;

        let user_prompt = if enriched_prompt.trim().is_empty() {
            DEFAULT_USER_PROMPT.to_string()
        } else {
            enriched_prompt.clone()
        };

        info!("request {}: generating story text", request_id);
        let messages = [
            ChatMessage::system(STORY_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];
        let content = self.openai.chat(&messages, 500, 0.7).await?;

        let (title, story) = parse_story_response(&content);
        let story = ensure_story_footer(story);
        info!("request {}: title: {}", request_id, title);

        let image_urls = if formats.iter().any(|f| f == COMIC_FORMAT) {
            self.generate_story_images(&story, &title, request_id, &enriched_prompt)
                .await
        } else {
            Vec::new()
        };

        self.db
            .finalize_story(story_id, &title, &story, &image_urls, formats)
            .await?;
        info!("request {}: story {} completed", request_id, story_id);

        Ok(GeneratedStory {
            story_id,
            title,
            story,
            image_urls,
        })
    }

    /// When the prompt mentions the user's active avatar by name, appends a
    /// character reference card so the text and images keep its traits.
    async fn enrich_with_avatar(&self, prompt: &str, user_id: Option<i64>) -> String {
        let Some(user_id) = user_id else {
            return prompt.to_string();
        };
        let avatar = match self.db.get_active_avatar(user_id).await {
            Ok(avatar) => avatar,
            Err(err) => {
                warn!("avatar lookup failed for user {}: {}", user_id, err);
                return prompt.to_string();
            }
        };
        let Some(avatar) = avatar else {
            return prompt.to_string();
        };
        let name = avatar.avatar_name.trim();
        if name.is_empty() || !prompt.to_lowercase().contains(&name.to_lowercase()) {
            return prompt.to_string();
        }

        info!("avatar '{}' detected in prompt, enriching", name);
        let mut enriched = format!("{}\n\nCHARACTER DETAILS FOR {}:\n", prompt, name);
        if let Some(traits) = avatar.traits_description.as_deref().filter(|t| !t.is_empty()) {
            enriched.push_str(&format!("Personality: {}\n", traits));
        }
        if let Some(visual) = avatar.visual_traits.as_deref().filter(|v| !v.is_empty()) {
            enriched.push_str(&format!("Appearance: {}\n", visual));
        }
        enriched.push_str(&format!(
            "Please ensure {} appears in the story with these specific traits and characteristics.",
            name
        ));
        enriched
    }

    /// Four comic pages, generated concurrently. Every failure becomes a
    /// placeholder URL so the page count stays fixed.
    async fn generate_story_images(
        &self,
        story: &str,
        title: &str,
        request_id: &str,
        enriched_prompt: &str,
    ) -> Vec<String> {
        let parts = match self.break_down_story(story).await {
            Ok(parts) => parts,
            Err(err) => {
                warn!("request {}: breakdown call failed: {}", request_id, err);
                fallback_parts(story)
            }
        };

        let character_guide = match self.consistency_guide(story, enriched_prompt).await {
            Ok(guide) => guide,
            Err(err) => {
                warn!("request {}: consistency guide failed: {}", request_id, err);
                String::new()
            }
        };

        info!("request {}: generating {} comic pages", request_id, COMIC_PAGES);
        let tasks = parts.iter().enumerate().map(|(index, part)| {
            let prompt = page_prompt(title, part, &character_guide, index);
            async move {
                match self.render_page(&prompt, request_id, index + 1).await {
                    Ok(url) => url,
                    Err(err) => {
                        warn!(
                            "request {}: page {} failed: {}",
                            request_id,
                            index + 1,
                            err
                        );
                        PLACEHOLDER_IMAGE_URL.to_string()
                    }
                }
            }
        });
        join_all(tasks).await
    }

    async fn break_down_story(&self, story: &str) -> Result<Vec<String>, ApiError> {
        let messages = [
            ChatMessage::system(BREAKDOWN_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Break down this story into 4 comic parts:\n\n{}",
                story
            )),
        ];
        let content = self.openai.chat(&messages, 800, 0.3).await?;
        let parts = split_story_parts(&content);
        if parts.len() == COMIC_PAGES {
            Ok(parts)
        } else {
            warn!("expected {} story parts, got {}", COMIC_PAGES, parts.len());
            Ok(fallback_parts(story))
        }
    }

    async fn consistency_guide(
        &self,
        story: &str,
        enriched_prompt: &str,
    ) -> Result<String, ApiError> {
        let character_references = extract_character_references(enriched_prompt);
        let messages = [
            ChatMessage::system(CONSISTENCY_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Create a detailed visual consistency guide for this story:\n\n\
                 STORY:\n{}\n{}\n\
                 REQUIREMENTS:\n\
                 - If character references are provided above, use them exactly for character appearances\n\
                 - Create consistent art style notes for all characters and scenes\n\
                 - Specify color palettes that must remain identical across all panels\n\
                 - Note distinctive features that must appear in every panel featuring each character\n\
                 - Ensure the comic style is cute, child-friendly, and visually consistent",
                story, character_references
            )),
        ];
        self.openai.chat(&messages, 600, 0.1).await
    }

    async fn render_page(
        &self,
        prompt: &str,
        request_id: &str,
        page: usize,
    ) -> Result<String, ApiError> {
        let s3 = self.s3.as_ref().ok_or(ApiError::StorageUnavailable)?;
        let bytes = self.openai.generate_image(prompt).await?;
        s3.put_object(&story_image_key(request_id, page), bytes, "image/png")
            .await
    }
}

/// First block is `Title: ...`, the rest is the story body. Anything that
/// doesn't match falls back to a stock title around the full text.
pub fn parse_story_response(content: &str) -> (String, String) {
    match content.split_once("\n\n") {
        Some((first, rest)) => {
            let title = first.replace("Title:", "").trim().to_string();
            (title, rest.trim().to_string())
        }
        None => (FALLBACK_TITLE.to_string(), content.trim().to_string()),
    }
}

/// Normalizes the closing line so every story ends with the branded footer
/// exactly once.
pub fn ensure_story_footer(mut story: String) -> String {
    if story.contains("(Created By - StoryLoom)") {
        return story;
    }
    if let Some(stripped) = story.strip_suffix("The End!") {
        story = stripped.trim_end().to_string();
    } else if story.contains("The End!") {
        story = story.replace("The End!", "").trim().to_string();
    }
    format!("{}\n\n{}", story, STORY_FOOTER)
}

pub fn split_story_parts(breakdown: &str) -> Vec<String> {
    breakdown
        .split(PART_BREAK)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Paragraph-based fallback when the breakdown call does not yield exactly
/// four parts: spread the paragraphs evenly, last part takes the remainder.
pub fn fallback_parts(story: &str) -> Vec<String> {
    let paragraphs: Vec<&str> = story
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.starts_with("The End!"))
        .collect();
    let per_part = (paragraphs.len() / COMIC_PAGES).max(1);

    (0..COMIC_PAGES)
        .map(|i| {
            let start = (i * per_part).min(paragraphs.len());
            let end = if i == COMIC_PAGES - 1 {
                paragraphs.len()
            } else {
                (start + per_part).min(paragraphs.len())
            };
            paragraphs[start..end].join("\n\n")
        })
        .collect()
}

/// Pulls `CHARACTER DETAILS FOR ...` cards out of an enriched prompt so the
/// consistency guide sees them verbatim.
fn extract_character_references(enriched_prompt: &str) -> String {
    let Some(start) = enriched_prompt.find("CHARACTER DETAILS FOR") else {
        return String::new();
    };
    format!(
        "\n=== STORED CHARACTER REFERENCES ===\n{}\n=== END CHARACTER REFERENCES ===\n",
        enriched_prompt[start..].trim()
    )
}

fn page_prompt(title: &str, story_part: &str, character_guide: &str, index: usize) -> String {
    format!(
        "Create a 4-panel comic-style illustration for \"{title}\".\n\n\
         STORY CONTENT:\n{story_part}\n\n\
         CHARACTER & STYLE CONSISTENCY GUIDE:\n{character_guide}\n\n\
         REQUIREMENTS:\n\
         - Exactly 4 panels in a 2x2 grid, progressing the story sequentially\n\
         - Follow the character descriptions exactly as specified in the consistency guide\n\
         - Identical facial features, hair, clothing and color palettes across panels\n\
         - Cute, friendly characters with big eyes and gentle expressions\n\
         - Soft pastel colors and a storybook-like visual style\n\
         - Speech bubbles or captions where appropriate, suitable for ages 3-5\n\n\
         This is image {page} of 4 in the series - characters must look identical to the guide and the other images.",
        title = title,
        story_part = story_part,
        character_guide = character_guide,
        page = index + 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_body() {
        let content = "Title: The Brave Little Fox\n\nOnce upon a time...\n\nThe End!";
        let (title, story) = parse_story_response(content);
        assert_eq!(title, "The Brave Little Fox");
        assert!(story.starts_with("Once upon a time"));
    }

    #[test]
    fn malformed_response_gets_fallback_title() {
        let (title, story) = parse_story_response("just a blob of text");
        assert_eq!(title, "A Magical Story");
        assert_eq!(story, "just a blob of text");
    }

    #[test]
    fn footer_is_appended_once() {
        let story = ensure_story_footer("A tale.\n\nThe End!".to_string());
        assert!(story.ends_with(STORY_FOOTER));
        assert_eq!(story.matches("The End!").count(), 1);

        let already = ensure_story_footer(format!("A tale.\n\n{}", STORY_FOOTER));
        assert_eq!(already.matches(STORY_FOOTER).count(), 1);
    }

    #[test]
    fn splits_on_part_break_marker() {
        let breakdown = "one\n---PART BREAK---\ntwo\n---PART BREAK---\nthree\n---PART BREAK---\nfour";
        let parts = split_story_parts(breakdown);
        assert_eq!(parts, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn fallback_always_yields_four_parts() {
        let story = "p1\n\np2\n\np3\n\np4\n\np5\n\np6\n\nThe End! (footer)";
        let parts = fallback_parts(story);
        assert_eq!(parts.len(), 4);
        assert!(parts[3].contains("p5"));
        assert!(parts[3].contains("p6"));

        let tiny = fallback_parts("only one paragraph");
        assert_eq!(tiny.len(), 4);
        assert_eq!(tiny[0], "only one paragraph");
    }

    #[test]
    fn character_references_are_extracted() {
        let prompt = "A story about Maya.\n\nCHARACTER DETAILS FOR Maya:\nPersonality: brave\n";
        let refs = extract_character_references(prompt);
        assert!(refs.contains("CHARACTER DETAILS FOR Maya"));
        assert!(refs.contains("=== STORED CHARACTER REFERENCES ==="));
        assert_eq!(extract_character_references("no characters here"), "");
    }
}
