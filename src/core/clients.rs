//! Process-wide clients.
//!
//! Built once at cold start and shared by every invocation. A failure here is
//! not fatal: it is captured and reported by the retry gate of each
//! invocation, so stale events are still acknowledged.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::adapters::{
    AdminDirectoryClient, CacheStore, DirectoryApi, MessageBus, PubSubBus, SqliteCacheStore,
};
use crate::config::ResolvedConfig;

/// Handles to the directory, the side-index and the output bus
#[derive(Clone)]
pub struct Clients {
    pub directory: Arc<dyn DirectoryApi>,
    pub cache: Arc<dyn CacheStore>,
    pub bus: Arc<dyn MessageBus>,
}

impl Clients {
    pub fn new(
        directory: Arc<dyn DirectoryApi>,
        cache: Arc<dyn CacheStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            directory,
            cache,
            bus,
        }
    }

    /// Build every client from the resolved configuration
    pub fn initialize(config: &ResolvedConfig) -> Result<Self> {
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("DIRFEED_ACCESS_TOKEN is not set")?;

        if config.project_id.is_empty() {
            anyhow::bail!("project_id is not configured");
        }

        let directory = AdminDirectoryClient::new(&config.directory.api_base, token)?;
        let bus = PubSubBus::new(&config.pubsub.api_base, &config.project_id, token)?;
        let cache = open_cache(config)?;

        info!(
            project_id = %config.project_id,
            cache = %config.cache_path.display(),
            "Clients initialized"
        );

        Ok(Self::new(Arc::new(directory), cache, Arc::new(bus)))
    }

    /// Like `initialize`, keeping the failure for the retry gate
    pub fn initialize_or_capture(config: &ResolvedConfig) -> Result<Self, String> {
        Self::initialize(config).map_err(|e| {
            let reason = format!("{:#}", e);
            error!(%reason, "COLD START initialization failed");
            reason
        })
    }
}

/// Open the side-index, creating its directory if needed
pub fn open_cache(config: &ResolvedConfig) -> Result<Arc<dyn CacheStore>> {
    if let Some(parent) = config.cache_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create cache directory: {}", parent.display())
        })?;
    }

    let store = SqliteCacheStore::open(&config.cache_path).with_context(|| {
        format!("Failed to open cache: {}", config.cache_path.display())
    })?;

    Ok(Arc::new(store))
}
