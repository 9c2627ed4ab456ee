pub mod paths;

use crate::services::FilterPolicy;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;

pub const SETTINGS_FILE: &str = "rackcfg.yaml";
pub const ENV_PREFIX: &str = "RACKCFG";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Engine settings.
///
/// Layered by [`SettingsManager::load`]: defaults, then `rackcfg.yaml`, then
/// `RACKCFG_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Persistence root. Relative paths are anchored to the install dir.
    pub data_dir: Option<String>,
    pub backup_retention: usize,
    pub restrict_site_pools_to_browse_set: bool,
    pub require_catalog_membership: bool,
    pub log_dir: String,
    pub debug: bool,
    /// YAML module catalog replacing the built-in one.
    pub catalog_file: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            backup_retention: 10,
            restrict_site_pools_to_browse_set: false,
            require_catalog_membership: false,
            log_dir: "logs".to_string(),
            debug: false,
            catalog_file: None,
        }
    }
}

impl EngineSettings {
    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            restrict_to_browse_set: self.restrict_site_pools_to_browse_set,
            require_catalog_membership: self.require_catalog_membership,
        }
    }

    pub fn resolve_data_dir(&self, install_dir: &Utf8Path) -> Utf8PathBuf {
        paths::resolve_against(
            install_dir,
            self.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR),
        )
    }

    pub fn resolve_log_dir(&self, install_dir: &Utf8Path) -> Utf8PathBuf {
        paths::resolve_against(install_dir, &self.log_dir)
    }

    pub fn resolve_catalog_file(&self, install_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        self.catalog_file
            .as_deref()
            .map(|file| paths::resolve_against(install_dir, file))
    }
}

/// Loads and saves [`EngineSettings`] in one directory.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl SettingsManager {
    pub fn new<P: AsRef<Utf8Path>>(settings_dir: P) -> Self {
        let settings_dir = settings_dir.as_ref().to_path_buf();
        Self {
            settings_path: settings_dir.join(SETTINGS_FILE),
            settings_dir,
        }
    }

    /// Settings next to the running executable.
    pub fn for_install_dir() -> Result<Self> {
        Ok(Self::new(paths::install_dir()?))
    }

    /// Load from the settings file and the process environment.
    pub fn load(&self) -> Result<EngineSettings> {
        self.load_with_env(None)
    }

    /// Load with an explicit environment map instead of the process
    /// environment. Keys carry the `RACKCFG_` prefix.
    pub fn load_with_env(
        &self,
        env: Option<config::Map<String, String>>,
    ) -> Result<EngineSettings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: EngineSettings = Config::builder()
            .add_source(
                File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to load settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded engine settings from {}", self.settings_dir);
        Ok(settings)
    }

    pub fn save(&self, settings: &EngineSettings) -> Result<()> {
        if !self.settings_dir.exists() {
            fs::create_dir_all(&self.settings_dir).with_context(|| {
                format!("Failed to create settings directory: {}", self.settings_dir)
            })?;
        }

        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;
        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved engine settings to {}", self.settings_path);
        Ok(())
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    pub fn settings_dir(&self) -> &Utf8Path {
        &self.settings_dir
    }
}
