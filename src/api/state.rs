use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::StartupError;
use crate::config::Config;
use crate::observability::Metrics;
use crate::proxy::ClientOptions;
use crate::routing::{Forwarder, RoutePolicy};
use crate::storage::{AssetStore, ResponseCache};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Route policies keyed by slug
    pub routes: Arc<BTreeMap<String, RoutePolicy>>,
    pub forwarder: Arc<Forwarder>,
    pub store: AssetStore,
    pub cache: Arc<ResponseCache>,
    /// Cache group of each provider
    pub cache_groups: Arc<BTreeMap<String, String>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        cache: Arc<ResponseCache>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, StartupError> {
        let routes = config.route_policies()?;
        let options = ClientOptions {
            connect_timeout: config.http.connect_timeout(),
            request_timeout: config.http.routing_timeout(),
            user_agent: None,
        };
        let forwarder = Forwarder::new(&config.proxy_router(), &options, metrics.clone())?;

        Ok(Self {
            routes: Arc::new(routes),
            forwarder: Arc::new(forwarder),
            store: AssetStore::new(config.assets.file_location.clone()),
            cache,
            cache_groups: Arc::new(config.cache_groups()),
            metrics,
            config: Arc::new(config),
        })
    }
}
