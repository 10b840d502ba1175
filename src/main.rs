use axum::routing::get;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackserver::config::AppConfig;
use trackserver::progression::{configure_track_routes, ProgressionEngine};
use trackserver::questions::{
    FallbackBank, HttpQuestionSource, QuestionCache, QuestionCacheConfig, QuestionService,
};
use trackserver::shared::state::AppState;
use trackserver::store::{MemoryStore, TrackStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trackserver=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::load()?;

    let store: Arc<dyn TrackStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(HttpQuestionSource::new(
        config.generator.base_url.clone(),
        Duration::from_secs(config.generator.timeout_secs),
    )?);
    let cache = QuestionCache::new(QuestionCacheConfig {
        ttl: Duration::from_secs(config.generator.cache_ttl_secs),
    });
    let questions = Arc::new(QuestionService::new(
        source,
        FallbackBank::new(),
        cache,
        config.generator.retry_limit,
    ));
    let engine = Arc::new(ProgressionEngine::new(
        store.clone(),
        questions,
        config.engine.clone(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        engine,
        store,
    });

    let app = configure_track_routes()
        .route("/health", get(|| async { "ok" }))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "trackserver listening");
    axum::serve(listener, app).await?;
    Ok(())
}
