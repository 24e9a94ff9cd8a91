use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{any, get},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    error::StartupError,
    services::{deliver_asset, health, proxy_request},
    state::AppState,
};
use crate::config::Config;
use crate::observability::Metrics;
use crate::proxy::ClientOptions;
use crate::retrieval::{AssetFetcher, RetrievalScheduler, RetryCoordinator};
use crate::storage::{AssetStore, ResponseCache};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the HTTP router for routing, delivery and health endpoints
pub fn router(state: AppState) -> Router {
    let proxy_path = format!("{}/{{route}}", state.config.server.proxy_context);
    let delivery_path = format!("{}/{{provider}}/{{asset}}", state.config.server.delivery_context);
    let body_limit = state.config.server.max_body_bytes;

    Router::new()
        .route(&proxy_path, any(proxy_request))
        .route(&delivery_path, get(deliver_asset))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        // Handles Content-Encoding of request bodies transparently
        .layer(RequestDecompressionLayer::new())
}

/// Assemble the retrieval scheduler for every enabled provider
pub fn build_scheduler(
    config: &Config,
    cache: Arc<ResponseCache>,
    metrics: Arc<Metrics>,
) -> Result<RetrievalScheduler, StartupError> {
    let store = AssetStore::new(config.assets.file_location.clone());
    let options = ClientOptions {
        connect_timeout: config.http.connect_timeout(),
        request_timeout: config.http.retrieval_timeout(),
        user_agent: Some(config.http.user_agent.clone()),
    };

    let fetcher = AssetFetcher::new(&config.proxy_router(), &options, store.clone(), metrics.clone())?;
    let coordinator = RetryCoordinator::new(Arc::new(fetcher), config.retry_policy());

    Ok(RetrievalScheduler::new(
        config.retrieval_jobs()?,
        coordinator,
        store,
        cache,
        metrics,
    ))
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(ResponseCache::new());
    let address: SocketAddr = config.server.bind_addr;

    let scheduler = Arc::new(build_scheduler(&config, cache.clone(), metrics.clone())?);
    let providers: Vec<&str> = scheduler.providers().collect();
    info!(?providers, "Starting retrieval schedulers");
    let tasks = scheduler.spawn();

    let state = AppState::new(config, cache, metrics)?;
    info!(
        routes = state.routes.len(),
        proxy_context = %state.config.server.proxy_context,
        delivery_context = %state.config.server.delivery_context,
        "Routes configured"
    );
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Privacy proxy listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    for task in &tasks {
        task.abort();
    }
    info!(tasks = tasks.len(), "Retrieval schedulers stopped");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
