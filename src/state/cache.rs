// Configuration cache
//
// Process-lifetime map from site name to the last applied configuration and
// its derived artifacts. Entries are immutable once built and swapped whole.

use crate::models::{DerivedArtifacts, ModelConfiguration};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("no cached configuration for site '{0}'")]
    NoCachedEntry(String),
}

/// A site's last applied configuration and what was derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub site: String,
    pub configuration: ModelConfiguration,
    pub artifacts: DerivedArtifacts,
    pub saved_at: DateTime<Utc>,
}

/// Shared handle to the per-site configuration cache.
///
/// Clones share one map. Readers get an `Arc<CacheEntry>` and keep seeing
/// that entry even if a writer replaces it afterwards; nobody can observe a
/// partially written entry because entries are never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationCache {
    entries: Arc<RwLock<HashMap<String, Arc<CacheEntry>>>>,
}

impl ConfigurationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_entry(&self, site: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(site)
    }

    /// Build a fresh entry and swap it in, replacing any previous one.
    pub fn save(
        &self,
        site: &str,
        configuration: ModelConfiguration,
        artifacts: DerivedArtifacts,
    ) -> Arc<CacheEntry> {
        self.insert(CacheEntry {
            site: site.to_string(),
            configuration,
            artifacts,
            saved_at: Utc::now(),
        })
    }

    /// Swap in a fully built entry.
    pub fn insert(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(entry);
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.site.clone(), Arc::clone(&entry));

        tracing::debug!(
            "Cached configuration for site {} ({} slot(s), replaced: {})",
            entry.site,
            entry.configuration.len(),
            previous.is_some()
        );
        entry
    }

    pub fn load(&self, site: &str) -> Result<Arc<CacheEntry>, CacheError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(site)
            .cloned()
            .ok_or_else(|| CacheError::NoCachedEntry(site.to_string()))
    }

    pub fn clear_site(&self, site: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(site)
            .is_some()
    }

    /// Drop every entry. Returns how many were dropped.
    pub fn clear_all(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        tracing::info!("Configuration cache cleared ({} site(s))", dropped);
        dropped
    }

    /// Cached site names, sorted.
    pub fn sites(&self) -> Vec<String> {
        let mut sites: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        sites.sort();
        sites
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotPosition;

    fn config(model: &str) -> ModelConfiguration {
        let mut config = ModelConfiguration::new();
        config.insert(SlotPosition::new(1, 2), model.to_string());
        config
    }

    #[test]
    fn test_load_missing_site() {
        let cache = ConfigurationCache::new();
        assert_eq!(
            cache.load("nowhere").unwrap_err(),
            CacheError::NoCachedEntry("nowhere".to_string())
        );
        assert!(!cache.has_entry("nowhere"));
    }

    #[test]
    fn test_save_overwrites_whole_entry() {
        let cache = ConfigurationCache::new();
        cache.save("S1", config("LK411"), DerivedArtifacts::default());
        let held = cache.load("S1").unwrap();

        cache.save("S1", config("LK610"), DerivedArtifacts::default());

        assert_eq!(held.configuration, config("LK411"));
        assert_eq!(cache.load("S1").unwrap().configuration, config("LK610"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_load_is_idempotent() {
        let cache = ConfigurationCache::new();
        cache.save("S1", config("LK411"), DerivedArtifacts::default());

        let first = cache.load("S1").unwrap();
        let second = cache.load("S1").unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ConfigurationCache::new();
        let reader = cache.clone();

        cache.save("B", config("LK411"), DerivedArtifacts::default());
        cache.save("A", config("LK411"), DerivedArtifacts::default());

        assert_eq!(reader.sites(), vec!["A".to_string(), "B".to_string()]);
        assert!(reader.clear_site("A"));
        assert!(!cache.has_entry("A"));
        assert_eq!(cache.clear_all(), 1);
        assert!(reader.is_empty());
    }
}
