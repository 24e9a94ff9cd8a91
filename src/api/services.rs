use axum::{
    Json,
    body::to_bytes,
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tracing::{debug, warn};

use super::{
    error::ApiError,
    models::HealthResponse,
    state::AppState,
    utils::{content_type_for, is_servable_name},
};
use crate::routing::{ForwardedResponse, InboundRequest};
use crate::storage::StorageError;

/// Routing endpoint (ANY <proxy_context>/{route})
///
/// Filters the client request through the route's policy, forwards it to
/// the third party and hands back the filtered response.
pub async fn proxy_request(
    State(state): State<AppState>,
    Path(route): Path<String>,
    request: Request,
) -> Result<ForwardedResponse, ApiError> {
    let policy = state
        .routes
        .get(&route)
        .ok_or_else(|| ApiError::NotFound(format!("route {}", route)))?;

    let (parts, body) = request.into_parts();

    let limit = state.config.server.max_body_bytes;
    let body = to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge(limit))?;

    let query = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let inbound = InboundRequest {
        query,
        headers: parts.headers,
        body,
        peer,
    };

    Ok(state.forwarder.forward(&inbound, policy).await?)
}

/// Delivery endpoint (GET <delivery_context>/{provider}/{asset})
///
/// Serves a committed asset from the response cache, loading it from the
/// asset store on a miss. Anything that cannot be served is a 404.
pub async fn deliver_asset(
    State(state): State<AppState>,
    Path((provider, asset)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let not_found = || ApiError::NotFound(format!("{}/{}", provider, asset));

    let group = state.cache_groups.get(&provider).ok_or_else(not_found)?;
    if !is_servable_name(&asset) {
        return Err(not_found());
    }

    let key = format!("{}/{}", provider, asset);
    let generation = state.cache.generation(group);
    let cached = match state.cache.get(group, &key) {
        Some(cached) => cached,
        None => match state.store.read(&provider, &asset).await {
            Ok(loaded) if !loaded.bytes.is_empty() => {
                state
                    .cache
                    .insert_if_current(group, key.clone(), loaded, generation)
            }
            Ok(_) => {
                debug!(asset = %key, "Asset is empty");
                return Err(not_found());
            }
            Err(StorageError::NotFound(_)) => {
                debug!(asset = %key, "Asset not retrieved yet");
                return Err(not_found());
            }
            Err(e) => {
                warn!(asset = %key, error = %e, "Failed to read asset");
                return Err(not_found());
            }
        },
    };

    state
        .metrics
        .asset_delivered(&key, cached.bytes.len() as u64);

    let content_type = HeaderValue::from_str(content_type_for(&asset).as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        cached.bytes.clone(),
    ))
}

/// Health check endpoint (GET /health)
///
/// Reports the asset store as unavailable when providers are configured
/// but the cache root does not exist; the response is then 503.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();

    let root_exists = tokio::fs::metadata(state.store.root())
        .await
        .is_ok_and(|m| m.is_dir());
    let store_healthy = root_exists || state.cache_groups.is_empty();
    components.insert(
        "asset_store".to_string(),
        if store_healthy { "healthy" } else { "unavailable" }.to_string(),
    );
    components.insert("routes".to_string(), format!("{} configured", state.routes.len()));

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if store_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
