use crate::models::{ChannelAddress, DerivedArtifacts, ModelConfiguration, SystemInfo};
use crate::state::CacheEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RECORD_VERSION: u32 = 1;

/// On-disk shape of one site's configuration.
///
/// Holds the model-level configuration only; instance identities are never
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    pub site: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub config: ModelConfiguration,
    #[serde(default)]
    pub system_info: SystemInfo,
    #[serde(default)]
    pub addresses: Vec<ChannelAddress>,
    #[serde(default)]
    pub io_count: usize,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

impl SiteRecord {
    pub fn new(site: &str, config: ModelConfiguration, artifacts: DerivedArtifacts) -> Self {
        Self {
            version: RECORD_VERSION,
            site: site.to_string(),
            saved_at: Utc::now(),
            config,
            system_info: artifacts.system_info,
            addresses: artifacts.addresses,
            io_count: artifacts.io_count,
        }
    }

    pub fn artifacts(&self) -> DerivedArtifacts {
        DerivedArtifacts {
            system_info: self.system_info.clone(),
            addresses: self.addresses.clone(),
            io_count: self.io_count,
        }
    }

    pub fn into_cache_entry(self) -> CacheEntry {
        let artifacts = self.artifacts();
        CacheEntry {
            site: self.site,
            configuration: self.config,
            artifacts,
            saved_at: self.saved_at,
        }
    }
}

impl From<&CacheEntry> for SiteRecord {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            version: RECORD_VERSION,
            site: entry.site.clone(),
            saved_at: entry.saved_at,
            config: entry.configuration.clone(),
            system_info: entry.artifacts.system_info.clone(),
            addresses: entry.artifacts.addresses.clone(),
            io_count: entry.artifacts.io_count,
        }
    }
}
