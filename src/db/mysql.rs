//! Pooled MySQL query layer.
//!
//! Every method takes `&self` and borrows the pool; callers decide about
//! transactions only where multi-statement invariants require them.

use chrono::{DateTime, Duration, Utc};
use sqlx::Error as SqlxError;
use sqlx::types::Json;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::models::{Avatar, AvatarStatus, PublicStory, Story, User};
use super::schema::MYSQL_INIT;

pub use sqlx::MySqlPool;

#[derive(Clone)]
pub struct Storage {
    pool: MySqlPool,
}

impl Storage {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Runs the DDL statement by statement; `CREATE TABLE IF NOT EXISTS`
    /// makes this idempotent across restarts.
    pub async fn init_schema(&self) -> Result<(), SqlxError> {
        for statement in MYSQL_INIT.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("database schema initialized");
        Ok(())
    }

    // ---- users ----

    pub async fn create_user(
        &self,
        email: &str,
        password_hash: Option<&str>,
        first_name: &str,
        last_name: &str,
        auth_type: super::models::AuthType,
        google_id: Option<&str>,
        is_verified: bool,
    ) -> Result<i64, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, first_name, last_name, auth_type, google_id, is_verified)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(first_name)
        .bind(last_name)
        .bind(auth_type)
        .bind(google_id)
        .bind(is_verified)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, SqlxError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? AND is_active = TRUE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, SqlxError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? AND is_active = TRUE")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, SqlxError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = ? AND is_active = TRUE")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn update_last_login(&self, user_id: i64) -> Result<(), SqlxError> {
        sqlx::query("UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Attaches a Google identity to an existing account and marks it verified.
    pub async fn link_google_account(
        &self,
        user_id: i64,
        google_id: &str,
    ) -> Result<(), SqlxError> {
        sqlx::query("UPDATE users SET google_id = ?, is_verified = TRUE WHERE id = ?")
            .bind(google_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_user_verified(&self, user_id: i64) -> Result<(), SqlxError> {
        sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft delete: the row stays for referential integrity, the account
    /// stops resolving everywhere that filters on `is_active`.
    pub async fn deactivate_user(&self, user_id: i64) -> Result<(), SqlxError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET is_active = FALSE WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE user_auth_sessions SET is_active = FALSE WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    // ---- one-time passwords ----

    /// Stores a fresh OTP and retires any outstanding codes for the address,
    /// so only the most recent code can ever verify.
    pub async fn store_otp(&self, email: &str, otp_code: &str) -> Result<(), SqlxError> {
        let expires_at = Utc::now() + Duration::minutes(5);
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE user_otps SET is_used = TRUE WHERE email = ? AND is_used = FALSE")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO user_otps (email, otp_code, expires_at) VALUES (?, ?, ?)")
            .bind(email)
            .bind(otp_code)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    /// Single-use verification: a matching code is consumed even though the
    /// comparison itself runs in constant time.
    pub async fn verify_otp(&self, email: &str, otp_code: &str) -> Result<bool, SqlxError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, otp_code FROM user_otps
             WHERE email = ? AND is_used = FALSE AND expires_at > CURRENT_TIMESTAMP
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, stored)) = row else {
            return Ok(false);
        };
        if stored.as_bytes().ct_eq(otp_code.as_bytes()).into() {
            sqlx::query("UPDATE user_otps SET is_used = TRUE WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ---- auth sessions ----

    pub async fn create_session(
        &self,
        user_id: i64,
        session_token: &str,
        expires_at: DateTime<Utc>,
        device_info: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "INSERT INTO user_auth_sessions (user_id, session_token, device_info, ip_address, expires_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(session_token)
        .bind(device_info)
        .bind(ip_address)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn session_is_active(&self, session_token: &str) -> Result<bool, SqlxError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM user_auth_sessions
             WHERE session_token = ? AND is_active = TRUE AND expires_at > CURRENT_TIMESTAMP",
        )
        .bind(session_token)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn invalidate_session(&self, session_token: &str) -> Result<(), SqlxError> {
        sqlx::query("UPDATE user_auth_sessions SET is_active = FALSE WHERE session_token = ?")
            .bind(session_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- stories ----

    /// Inserts the IN_PROGRESS placeholder row that generation later fills in.
    pub async fn create_story_placeholder(
        &self,
        prompt: &str,
        request_id: &str,
        user_id: Option<i64>,
    ) -> Result<i64, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO stories (title, story_content, prompt, request_id, user_id, status)
             VALUES ('', '', ?, ?, ?, 'IN_PROGRESS')",
        )
        .bind(prompt)
        .bind(request_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn finalize_story(
        &self,
        story_id: i64,
        title: &str,
        story_content: &str,
        image_urls: &[String],
        formats: &[String],
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "UPDATE stories SET title = ?, story_content = ?, image_urls = ?, formats = ?, status = 'NEW'
             WHERE id = ?",
        )
        .bind(title)
        .bind(story_content)
        .bind(Json(image_urls))
        .bind(Json(formats))
        .bind(story_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_story(&self, story_id: i64) -> Result<Option<Story>, SqlxError> {
        sqlx::query_as::<_, Story>("SELECT * FROM stories WHERE id = ?")
            .bind(story_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// VIEWED is terminal, so the transition only ever fires on NEW rows
    /// owned by the caller.
    pub async fn mark_story_viewed(&self, story_id: i64, user_id: i64) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "UPDATE stories SET status = 'VIEWED'
             WHERE id = ? AND user_id = ? AND status = 'NEW'",
        )
        .bind(story_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_user_stories(&self, user_id: i64) -> Result<Vec<Story>, SqlxError> {
        sqlx::query_as::<_, Story>(
            "SELECT * FROM stories
             WHERE user_id = ? AND status IN ('NEW', 'VIEWED')
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_new_stories(&self, user_id: i64) -> Result<i64, SqlxError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM stories WHERE user_id = ? AND status = 'NEW'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Deletes rows that never produced usable output: stuck IN_PROGRESS
    /// placeholders and finished stories whose images all fell back to the
    /// placeholder URL. Returns the number of rows removed.
    pub async fn cleanup_invalid_stories(
        &self,
        placeholder_url: &str,
        stuck_after_minutes: i64,
    ) -> Result<u64, SqlxError> {
        let stuck = sqlx::query(
            "DELETE FROM stories
             WHERE status = 'IN_PROGRESS'
               AND created_at < (CURRENT_TIMESTAMP - INTERVAL ? MINUTE)",
        )
        .bind(stuck_after_minutes)
        .execute(&self.pool)
        .await?;
        let broken = sqlx::query(
            "DELETE FROM stories
             WHERE status != 'IN_PROGRESS'
               AND (image_urls IS NULL
                    OR JSON_LENGTH(image_urls) = 0
                    OR JSON_SEARCH(image_urls, 'one', ?) IS NOT NULL)",
        )
        .bind(placeholder_url)
        .execute(&self.pool)
        .await?;
        Ok(stuck.rows_affected() + broken.rows_affected())
    }

    // ---- fun facts ----

    pub async fn save_fun_facts(
        &self,
        prompt: &str,
        facts: &serde_json::Value,
        request_id: &str,
    ) -> Result<i64, SqlxError> {
        let result =
            sqlx::query("INSERT INTO fun_facts (prompt, facts, request_id) VALUES (?, ?, ?)")
                .bind(prompt)
                .bind(Json(facts))
                .bind(request_id)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_id() as i64)
    }

    // ---- avatars ----

    /// Creates a new avatar row and retires the previous active one in the
    /// same transaction, keeping at most one active avatar per user.
    pub async fn create_avatar(
        &self,
        user_id: i64,
        avatar_name: &str,
        traits_description: Option<&str>,
        s3_image_url: &str,
        status: AvatarStatus,
    ) -> Result<i64, SqlxError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE user_avatars SET is_active = FALSE WHERE user_id = ? AND is_active = TRUE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            "INSERT INTO user_avatars (user_id, avatar_name, traits_description, s3_image_url, status)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(avatar_name)
        .bind(traits_description)
        .bind(s3_image_url)
        .bind(status)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn complete_avatar(
        &self,
        avatar_id: i64,
        s3_image_url: &str,
        traits_description: &str,
        visual_traits: Option<&str>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "UPDATE user_avatars
             SET s3_image_url = ?, traits_description = ?, visual_traits = ?, status = 'COMPLETED'
             WHERE id = ?",
        )
        .bind(s3_image_url)
        .bind(traits_description)
        .bind(visual_traits)
        .bind(avatar_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_avatar(&self, avatar_id: i64) -> Result<(), SqlxError> {
        sqlx::query("UPDATE user_avatars SET status = 'FAILED', is_active = FALSE WHERE id = ?")
            .bind(avatar_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_active_avatar(&self, user_id: i64) -> Result<Option<Avatar>, SqlxError> {
        sqlx::query_as::<_, Avatar>(
            "SELECT * FROM user_avatars
             WHERE user_id = ? AND is_active = TRUE
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_avatar(&self, avatar_id: i64, user_id: i64) -> Result<Option<Avatar>, SqlxError> {
        sqlx::query_as::<_, Avatar>("SELECT * FROM user_avatars WHERE id = ? AND user_id = ?")
            .bind(avatar_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Renames or re-describes the active avatar without touching its image.
    pub async fn update_avatar_details(
        &self,
        avatar_id: i64,
        avatar_name: Option<&str>,
        traits_description: Option<&str>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "UPDATE user_avatars
             SET avatar_name = COALESCE(?, avatar_name),
                 traits_description = COALESCE(?, traits_description)
             WHERE id = ?",
        )
        .bind(avatar_name)
        .bind(traits_description)
        .bind(avatar_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_completed_avatars(&self, user_id: i64) -> Result<i64, SqlxError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM user_avatars WHERE user_id = ? AND status = 'COMPLETED'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    // ---- public gallery ----

    pub async fn publish_story(
        &self,
        story: &Story,
        category: Option<&str>,
        age_group: Option<&str>,
        featured: bool,
        tags: &[String],
    ) -> Result<i64, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO public_stories (title, story_content, prompt, image_urls, formats, category, age_group, featured, tags)
             VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, '3-5'), ?, ?)",
        )
        .bind(&story.title)
        .bind(&story.story_content)
        .bind(&story.prompt)
        .bind(&story.image_urls)
        .bind(&story.formats)
        .bind(category)
        .bind(age_group)
        .bind(featured)
        .bind(Json(tags))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn list_public_stories(
        &self,
        category: Option<&str>,
        featured_only: bool,
        limit: i64,
    ) -> Result<Vec<PublicStory>, SqlxError> {
        sqlx::query_as::<_, PublicStory>(
            "SELECT * FROM public_stories
             WHERE is_active = TRUE
               AND (? IS NULL OR category = ?)
               AND (? = FALSE OR featured = TRUE)
             ORDER BY featured DESC, created_at DESC
             LIMIT ?",
        )
        .bind(category)
        .bind(category)
        .bind(featured_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
