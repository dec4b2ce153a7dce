use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{delete, get, post, put};
use axum_extra::extract::cookie::Key;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use sha2::{Digest, Sha512};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{google, handlers as auth_handlers};
use crate::config::{CONFIG, MAX_AVATAR_UPLOAD_BYTES, STORY_DUPLICATE_WINDOW_SECS};
use crate::db::Storage;
use crate::email::EmailService;
use crate::handlers::{avatar, health, public, story};
use crate::service::{AvatarStudio, FunFactsService, StoryGenerator};
use crate::storage::S3Client;

#[derive(Clone)]
pub struct AppState {
    pub db: Storage,
    pub http: reqwest::Client,
    pub story: StoryGenerator,
    pub avatars: AvatarStudio,
    pub fun_facts: FunFactsService,
    pub email: EmailService,
    pub story_throttle: Arc<DefaultKeyedRateLimiter<String>>,
    cookie_key: Key,
}

impl AppState {
    pub fn new(db: Storage) -> Self {
        let http = reqwest::Client::new();
        let openai = crate::api::OpenAiClient::new(http.clone(), CONFIG.openai_api_key.clone());
        let s3 = S3Client::from_config(http.clone());
        let email = EmailService::from_config(http.clone());

        let quota = Quota::with_period(Duration::from_secs(STORY_DUPLICATE_WINDOW_SECS))
            .expect("nonzero duplicate window");
        let story_throttle = Arc::new(RateLimiter::keyed(quota));

        // The private cookie jar wants 64 bytes of key material; stretch the
        // JWT secret instead of requiring a second secret.
        let cookie_key = Key::from(Sha512::digest(CONFIG.jwt_secret_key.as_bytes()).as_slice());

        Self {
            story: StoryGenerator::new(openai.clone(), db.clone(), s3.clone()),
            avatars: AvatarStudio::new(openai.clone(), db.clone(), s3),
            fun_facts: FunFactsService::new(openai, db.clone()),
            db,
            http,
            email,
            story_throttle,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ping", get(health::ping))
        // stories
        .route("/generateStory", post(story::generate_story))
        .route("/story/{story_id}/status", get(story::story_status))
        .route("/story/{story_id}/viewed", put(story::mark_story_viewed))
        .route("/my-stories", get(story::my_stories))
        .route("/generateFunFacts", post(story::generate_fun_facts))
        // avatars
        .route(
            "/personalization/avatar",
            post(avatar::create_avatar)
                .get(avatar::get_avatar)
                .put(avatar::update_avatar),
        )
        .route(
            "/personalization/avatar/async",
            post(avatar::create_avatar_async),
        )
        .route(
            "/personalization/avatar/status/{avatar_id}",
            get(avatar::avatar_status),
        )
        .route(
            "/personalization/completed-count",
            get(avatar::completed_count),
        )
        // public gallery and admin
        .route("/public-stories", get(public::list_public_stories))
        .route("/admin/publish-story/{story_id}", post(public::publish_story))
        .route("/admin/cleanup-stories", post(public::cleanup_stories))
        // auth
        .route("/auth/signup", post(auth_handlers::signup))
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/send-otp", post(auth_handlers::send_otp))
        .route("/auth/verify-otp", post(auth_handlers::verify_otp))
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/auth/me", get(auth_handlers::me))
        .route("/auth/delete-account", delete(auth_handlers::delete_account))
        .route("/auth/google", get(google::google_oauth_entry))
        .route("/auth/google/callback", get(google::google_oauth_callback))
        .layer(DefaultBodyLimit::max(MAX_AVATAR_UPLOAD_BYTES + 64 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
