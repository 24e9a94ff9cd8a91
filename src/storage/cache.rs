//! In-memory response cache in front of the asset store.
//!
//! Entries are grouped by cache group; the retrieval scheduler drops a
//! whole group once a run has finished writing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::CachedAsset;

#[derive(Debug, Default)]
struct CacheGroup {
    /// Bumped on every invalidation
    generation: u64,
    entries: HashMap<String, Arc<CachedAsset>>,
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    groups: RwLock<HashMap<String, CacheGroup>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group: &str, key: &str) -> Option<Arc<CachedAsset>> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups.get(group).and_then(|g| g.entries.get(key)).cloned()
    }

    /// Current generation of `group`; take it before loading from disk and
    /// hand it to [`insert_if_current`](Self::insert_if_current)
    pub fn generation(&self, group: &str) -> u64 {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups.get(group).map_or(0, |g| g.generation)
    }

    pub fn insert(&self, group: &str, key: impl Into<String>, asset: CachedAsset) -> Arc<CachedAsset> {
        let asset = Arc::new(asset);
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        groups
            .entry(group.to_string())
            .or_default()
            .entries
            .insert(key.into(), asset.clone());
        asset
    }

    /// Insert only if `group` was not invalidated since `generation` was
    /// read. The asset is returned either way.
    pub fn insert_if_current(
        &self,
        group: &str,
        key: impl Into<String>,
        asset: CachedAsset,
        generation: u64,
    ) -> Arc<CachedAsset> {
        let asset = Arc::new(asset);
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        let entry = groups.entry(group.to_string()).or_default();
        if entry.generation == generation {
            entry.entries.insert(key.into(), asset.clone());
        } else {
            tracing::debug!(group, "Not caching asset loaded before an invalidation");
        }
        asset
    }

    /// Drop every entry of `group`, returning how many were removed
    pub fn invalidate_group(&self, group: &str) -> usize {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        let entry = groups.entry(group.to_string()).or_default();
        entry.generation += 1;
        let removed = entry.entries.len();
        entry.entries.clear();
        tracing::debug!(group, removed, "Invalidated cache group");
        removed
    }

    pub fn len(&self, group: &str) -> usize {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups.get(group).map_or(0, |g| g.entries.len())
    }
}
