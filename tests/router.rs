use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use sqlx::mysql::MySqlPoolOptions;
use storyloom::AppState;
use storyloom::db::Storage;
use storyloom::router::app_router;
use tower::ServiceExt;

/// Router wired against a lazy pool: no connection is made until a handler
/// actually touches the database, so DB-free routes are testable offline.
fn test_app() -> axum::Router {
    // Fail fast when no database is listening; the default 30s acquire
    // timeout would outlast the duplicate-prompt window.
    let pool = MySqlPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(1))
        .connect_lazy("mysql://root@127.0.0.1:3306/storyloom_test")
        .expect("valid database url");
    app_router(AppState::new(Storage::new(pool)))
}

#[tokio::test]
async fn ping_answers_pong() {
    let response = test_app()
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"pong");
}

#[tokio::test]
async fn health_reports_service_metadata() {
    let response = test_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "storyloom");
}

#[tokio::test]
async fn protected_routes_reject_missing_token() {
    for (method, path) in [
        ("GET", "/my-stories"),
        ("GET", "/personalization/avatar"),
        ("GET", "/personalization/completed-count"),
        ("GET", "/auth/me"),
        ("POST", "/admin/cleanup-stories"),
    ] {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(path)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{} {} should require auth",
            method,
            path
        );
    }
}

#[tokio::test]
async fn protected_routes_reject_garbage_token() {
    let response = test_app()
        .oneshot(
            Request::get("/my-stories")
                .header(header::AUTHORIZATION, "Bearer not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");
}

/// A signature-valid token is not enough on its own: without an active row
/// in the session table (none exists here, the pool cannot even connect)
/// the request must come back 401, not reach the handler.
#[tokio::test]
async fn token_without_backing_session_is_rejected() {
    let token = storyloom::auth::issue_token(7, "kid@example.com", storyloom::db::AuthType::EmailPassword)
        .expect("token issuance");

    let response = test_app()
        .oneshot(
            Request::get("/my-stories")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");
}

/// The second identical prompt inside the duplicate window is turned away
/// before any database work happens.
#[tokio::test]
async fn duplicate_prompt_is_throttled() {
    let app = test_app();
    let request = || {
        Request::post("/generateStory")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"prompt": "a fox who learns to share", "formats": ["Text Story"]}"#,
            ))
            .unwrap()
    };

    // First attempt gets past the throttle (and then fails in the DB layer,
    // which is fine: the throttle fires before any storage access).
    let first = app.clone().oneshot(request()).await.unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

    let second = app.oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = axum::body::to_bytes(second.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "DUPLICATE_REQUEST");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let response = test_app()
        .oneshot(Request::get("/definitely-not-a-route").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
