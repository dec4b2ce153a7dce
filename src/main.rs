use mimalloc::MiMalloc;
use sqlx::mysql::MySqlPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &storyloom::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        bind_addr = %cfg.bind_addr,
        s3_bucket = %cfg.s3_bucket,
        loglevel = %cfg.loglevel,
        "starting up"
    );
    if cfg.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set; generation endpoints will fail");
    }

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;
    let storage = storyloom::db::Storage::new(pool);
    storage.init_schema().await?;
    info!("database ready");

    let state = storyloom::router::AppState::new(storage);

    // The keyed throttle otherwise keeps one entry per prompt forever;
    // sweep out entries whose window has passed.
    let throttle = state.story_throttle.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tick.tick().await;
            throttle.retain_recent();
        }
    });

    let app = storyloom::router::app_router(state);

    let listener = TcpListener::bind(&cfg.bind_addr).await?;
    info!("HTTP server listening on {}", cfg.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
