use super::SessionEvent;
use super::cache::{CacheEntry, CacheError, ConfigurationCache};
use crate::metrics::EngineMetrics;
use crate::models::{
    Catalog, DerivedArtifacts, InstanceId, ModuleInstance, SiteInventory, SlotPosition,
};
use crate::services::{
    AssignError, FilterPolicy, PoolBuilder, PoolWarning, RackTopology, ReconcileWarning,
    SitePartition, derive_artifacts,
};
use crate::settings::EngineSettings;
use crate::store::{PersistenceError, PersistenceStore, WriteOutcome};
use anyhow::Context;
use camino::Utf8Path;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no site is active")]
    NoActiveSite,

    #[error("site '{0}' has no loaded inventory")]
    SiteNotLoaded(String),

    #[error("failed to load inventory for site '{site}': {reason}")]
    Inventory { site: String, reason: String },

    #[error(transparent)]
    Assign(#[from] AssignError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Supplies raw device inventories per site.
pub trait InventorySource {
    fn site_inventory(&self, site: &str) -> anyhow::Result<SiteInventory>;
}

/// Where a loaded site's configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    /// Reconciled from the cache entry
    Cache,
    /// Nothing cached; everything starts available
    Fresh,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub site: String,
    pub source: RestoreSource,
    pub pool_warnings: Vec<PoolWarning>,
    pub reconcile_warnings: Vec<ReconcileWarning>,
    pub available: usize,
    pub configured: usize,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub entry: Arc<CacheEntry>,
    pub write: WriteOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub cache_entries: usize,
    pub archived_files: usize,
}

struct LoadedSite {
    partition: SitePartition,
    source: RestoreSource,
}

/// One project's engine state: catalog, cache, store and the live
/// partitions of every loaded site.
///
/// The session is the single mutator. Background readers clone the cache
/// handle from [`cache`](Self::cache) and only ever see whole entries.
pub struct ProjectSession {
    catalog: Arc<Catalog>,
    policy: FilterPolicy,
    cache: ConfigurationCache,
    store: PersistenceStore,
    sites: HashMap<String, LoadedSite>,
    current: Option<String>,
    metrics: Arc<EngineMetrics>,
    events: broadcast::Sender<SessionEvent>,
}

impl ProjectSession {
    /// Open a project, warming the cache from every readable persisted
    /// record. Corrupt records are logged and left on disk.
    pub fn open(
        catalog: Arc<Catalog>,
        policy: FilterPolicy,
        store: PersistenceStore,
    ) -> Result<Self, SessionError> {
        let cache = ConfigurationCache::new();
        for record in store.load_all()? {
            cache.insert(record.into_cache_entry());
        }

        tracing::info!(
            "Project opened at {} with {} cached site(s)",
            store.root(),
            cache.len()
        );

        let (events, _) = broadcast::channel(100);
        Ok(Self {
            catalog,
            policy,
            cache,
            store,
            sites: HashMap::new(),
            current: None,
            metrics: Arc::new(EngineMetrics::new()),
            events,
        })
    }

    /// Open a project from engine settings, resolving the catalog and data
    /// directory against `install_dir`.
    pub fn from_settings(settings: &EngineSettings, install_dir: &Utf8Path) -> anyhow::Result<Self> {
        let catalog = match settings.resolve_catalog_file(install_dir) {
            Some(path) => Catalog::load(&path)?,
            None => Catalog::builtin(),
        };

        let data_dir = settings.resolve_data_dir(install_dir);
        let store = PersistenceStore::open(&data_dir, settings.backup_retention)
            .with_context(|| format!("Failed to open persistence store: {}", data_dir))?;

        Self::open(Arc::new(catalog), settings.filter_policy(), store)
            .context("Failed to open project session")
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Make `site` the active site and look it up in the cache.
    ///
    /// Must run before [`load_inventory`](Self::load_inventory).
    /// `Err(CacheError::NoCachedEntry)` is the ordinary first-visit outcome;
    /// the site is active either way.
    pub fn current_site(&mut self, site: &str) -> Result<Arc<CacheEntry>, CacheError> {
        self.current = Some(site.to_string());
        let lookup = self.cache.load(site);

        tracing::info!("Active site: {} (cached: {})", site, lookup.is_ok());
        self.emit(SessionEvent::SiteActivated {
            site: site.to_string(),
            cached: lookup.is_ok(),
        });
        lookup
    }

    pub fn active_site(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn require_active(&self) -> Result<String, SessionError> {
        self.current.clone().ok_or(SessionError::NoActiveSite)
    }

    /// Mint a fresh pool for the active site and restore its configuration
    /// from the cache, or start with everything available.
    ///
    /// Replaces any earlier pool for the site, unapplied edits included.
    pub fn load_inventory(&mut self, inventory: &SiteInventory) -> Result<LoadReport, SessionError> {
        let site = self.require_active()?;

        let build = PoolBuilder::new(&self.catalog, self.policy).build(&site, inventory);
        self.metrics.record_pool_built();
        let topology = RackTopology::from_inventory(inventory, &self.catalog);

        let (partition, source, reconcile_warnings) = match self.cache.load(&site) {
            Ok(entry) => {
                self.metrics.record_cache_hit();

                let started = Instant::now();
                let (partition, warnings) =
                    SitePartition::from_reconciliation(build.pool, topology, &entry.configuration);
                let partial = warnings
                    .iter()
                    .filter(|w| matches!(w, ReconcileWarning::PartialReservation { .. }))
                    .count();
                let unresolved = warnings
                    .iter()
                    .filter(|w| matches!(w, ReconcileWarning::UnresolvedSlot { .. }))
                    .count();
                self.metrics
                    .record_reconcile(started.elapsed(), partial, unresolved);

                (partition, RestoreSource::Cache, warnings)
            }
            Err(CacheError::NoCachedEntry(_)) => {
                self.metrics.record_cache_miss();
                (
                    SitePartition::fresh(build.pool, topology),
                    RestoreSource::Fresh,
                    Vec::new(),
                )
            }
        };

        let report = LoadReport {
            site: site.clone(),
            source,
            pool_warnings: build.warnings,
            reconcile_warnings,
            available: partition.available_instances().len(),
            configured: partition.configuration().len(),
        };

        for warning in &report.reconcile_warnings {
            tracing::warn!("Site {}: {}", site, warning);
        }

        self.emit(SessionEvent::PoolRebuilt {
            site: site.clone(),
            instances: partition.pool().len(),
            source,
        });
        if source == RestoreSource::Cache {
            self.emit(SessionEvent::ConfigurationRestored {
                site: site.clone(),
                configured: report.configured,
                warnings: report.reconcile_warnings.len(),
            });
        }

        self.sites.insert(site, LoadedSite { partition, source });
        Ok(report)
    }

    /// Activate `site` and load its inventory from `source`.
    pub fn switch_site(
        &mut self,
        site: &str,
        source: &dyn InventorySource,
    ) -> Result<LoadReport, SessionError> {
        // A miss just means the site starts fresh
        let _ = self.current_site(site);

        let inventory = source
            .site_inventory(site)
            .map_err(|e| SessionError::Inventory {
                site: site.to_string(),
                reason: format!("{:#}", e),
            })?;

        self.load_inventory(&inventory)
    }

    fn loaded_mut(&mut self) -> Result<(String, &mut SitePartition), SessionError> {
        let site = self.require_active()?;
        match self.sites.get_mut(&site) {
            Some(loaded) => Ok((site, &mut loaded.partition)),
            None => Err(SessionError::SiteNotLoaded(site)),
        }
    }

    fn loaded(&self, site: &str) -> Result<&LoadedSite, SessionError> {
        self.sites
            .get(site)
            .ok_or_else(|| SessionError::SiteNotLoaded(site.to_string()))
    }

    /// Bind an available instance of the active site to `slot`.
    pub fn assign(&mut self, slot: SlotPosition, instance: InstanceId) -> Result<(), SessionError> {
        let (site, partition) = self.loaded_mut()?;
        partition.assign(slot, instance)?;

        self.emit(SessionEvent::InstanceAssigned {
            site,
            slot,
            instance,
        });
        Ok(())
    }

    /// Release whatever is bound at `slot` of the active site.
    pub fn unassign(&mut self, slot: SlotPosition) -> Result<Option<InstanceId>, SessionError> {
        let (site, partition) = self.loaded_mut()?;
        let released = partition.unassign(slot);

        if let Some(instance) = released {
            self.emit(SessionEvent::InstanceUnassigned {
                site,
                slot,
                instance,
            });
        }
        Ok(released)
    }

    /// Commit the active site's configuration.
    ///
    /// Persists first and swaps the cache entry only once the write landed,
    /// so a failed write leaves the previous entry in place.
    pub fn apply(&mut self) -> Result<ApplyOutcome, SessionError> {
        let site = self.require_active()?;
        let loaded = self.loaded(&site)?;

        let config = loaded.partition.applied_configuration();
        let artifacts = derive_artifacts(&config, &self.catalog, loaded.partition.topology());

        let write = match self.store.write_site_config(&site, &config, &artifacts) {
            Ok(write) => write,
            Err(e) => {
                self.metrics.record_persistence_failure();
                tracing::error!("Apply failed for site {}: {}", site, e);
                return Err(e.into());
            }
        };
        let fallback = matches!(write, WriteOutcome::Fallback(_));
        self.metrics.record_persistence_write(fallback);

        let modules = config.len();
        let io_count = artifacts.io_count;
        let entry = self.cache.save(&site, config, artifacts);

        tracing::info!(
            "Applied configuration for site {}: {} module(s), {} IO channel(s)",
            site,
            modules,
            io_count
        );
        self.emit(SessionEvent::ConfigurationApplied {
            site,
            modules,
            io_count,
            fallback,
        });

        Ok(ApplyOutcome { entry, write })
    }

    /// Drop every cache entry and loaded site. With `archive_files`, also
    /// move every persisted record into the backup area.
    pub fn clear_project(&mut self, archive_files: bool) -> Result<ClearReport, SessionError> {
        let cache_entries = self.cache.clear_all();
        self.sites.clear();
        self.current = None;

        let mut archived_files = 0;
        if archive_files {
            for site in self.store.list_saved_sites()? {
                if self.store.archive_site_config(&site)?.is_some() {
                    archived_files += 1;
                }
            }
        }

        tracing::info!(
            "Project cleared: {} cache entr(ies), {} file(s) archived",
            cache_entries,
            archived_files
        );
        self.emit(SessionEvent::ProjectCleared {
            sites: cache_entries,
            archived: archived_files,
        });
        self.metrics.log_summary();

        Ok(ClearReport {
            cache_entries,
            archived_files,
        })
    }

    /// Copies of the site's available instances, model then ordinal order.
    pub fn available_instances(&self, site: &str) -> Result<Vec<ModuleInstance>, SessionError> {
        Ok(self
            .loaded(site)?
            .partition
            .available_instances()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Copies of the site's user-configured slots.
    pub fn configured_slots(
        &self,
        site: &str,
    ) -> Result<BTreeMap<SlotPosition, ModuleInstance>, SessionError> {
        Ok(self
            .loaded(site)?
            .partition
            .configured_instances()
            .into_iter()
            .map(|(slot, instance)| (slot, instance.clone()))
            .collect())
    }

    /// Artifacts of the site's last applied configuration.
    pub fn derived_system_info(&self, site: &str) -> Result<DerivedArtifacts, SessionError> {
        Ok(self.cache.load(site)?.artifacts.clone())
    }

    pub fn topology(&self, site: &str) -> Option<RackTopology> {
        self.sites.get(site).map(|loaded| *loaded.partition.topology())
    }

    pub fn restore_source(&self, site: &str) -> Option<RestoreSource> {
        self.sites.get(site).map(|loaded| loaded.source)
    }

    /// Read-only view of a loaded site's partition.
    pub fn partition(&self, site: &str) -> Option<&SitePartition> {
        self.sites.get(site).map(|loaded| &loaded.partition)
    }

    pub fn cache(&self) -> ConfigurationCache {
        self.cache.clone()
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }
}
