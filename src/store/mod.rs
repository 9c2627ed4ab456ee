// Persistence store
//
// Durable per-site configuration files under one data directory:
//
//   <root>/sites/<stem>.yaml                     current record per site
//   <root>/backups/<stem>__<timestamp>__<seq>.yaml  superseded records
//   <root>/legacy/                               imported legacy JSON files
//
// A site file is only ever replaced by rename; the previous one is rotated
// into backups first.

pub mod legacy;
pub mod record;

pub use legacy::MigrationReport;
pub use record::{RECORD_VERSION, SiteRecord};

use crate::models::{DerivedArtifacts, ModelConfiguration};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use std::fs;
use std::io;
use thiserror::Error;

const SITES_DIR: &str = "sites";
const BACKUP_DIR: &str = "backups";
const LEGACY_ARCHIVE_DIR: &str = "legacy";
const RECORD_EXT: &str = "yaml";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3f";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write configuration for site '{site}': {primary}; fallback also failed: {fallback}")]
    WriteFailed {
        site: String,
        primary: String,
        fallback: String,
    },

    #[error("configuration file {path} is unreadable: {reason}")]
    Corrupt { path: Utf8PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize configuration record: {0}")]
    Serialize(#[from] serde_yaml_ng::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Where a successful write landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Primary(Utf8PathBuf),
    /// The primary location failed and the record went to the backup area.
    Fallback(Utf8PathBuf),
}

impl WriteOutcome {
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Primary(path) | Self::Fallback(path) => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: Utf8PathBuf,
    pub stem: String,
    pub created: NaiveDateTime,
    pub seq: u64,
}

/// Turn a site name into a file stem: alphanumerics and `._- ` are kept,
/// everything else becomes `_`.
pub fn sanitize_site_name(site: &str) -> String {
    let stem: String = site
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || "._- ".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem.trim().to_string()
}

pub struct PersistenceStore {
    root: Utf8PathBuf,
    sites_dir: Utf8PathBuf,
    backup_dir: Utf8PathBuf,
    retention: usize,
    backup_pattern: Regex,
}

impl PersistenceStore {
    /// Open (creating if needed) a store rooted at `root`, keeping at most
    /// `retention` backups per site.
    pub fn open<P: AsRef<Utf8Path>>(root: P, retention: usize) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        let sites_dir = root.join(SITES_DIR);
        let backup_dir = root.join(BACKUP_DIR);

        for dir in [&sites_dir, &backup_dir] {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }

        tracing::info!(
            "Persistence store opened at {} (backup retention {})",
            root,
            retention
        );

        Ok(Self {
            root,
            sites_dir,
            backup_dir,
            retention: retention.max(1),
            backup_pattern: Regex::new(r"^(.+)__(\d{8}T\d{9})__(\d+)\.yaml$")
                .expect("Invalid backup name regex"),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn backup_dir(&self) -> &Utf8Path {
        &self.backup_dir
    }

    fn stem_for(&self, site: &str) -> Result<String, PersistenceError> {
        let stem = sanitize_site_name(site);
        if stem.is_empty() || stem.chars().all(|c| c == '.') {
            return Err(PersistenceError::InvalidPath(format!(
                "site name '{}' has no usable file name",
                site
            )));
        }
        Ok(stem)
    }

    fn site_path(&self, stem: &str) -> Utf8PathBuf {
        self.sites_dir.join(format!("{}.{}", stem, RECORD_EXT))
    }

    /// Path of the current record for `site`.
    pub fn site_config_path(&self, site: &str) -> Result<Utf8PathBuf, PersistenceError> {
        Ok(self.site_path(&self.stem_for(site)?))
    }

    pub fn has_site_config(&self, site: &str) -> bool {
        self.site_config_path(site)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Write a site's configuration, rotating the previous record into
    /// backups.
    ///
    /// If the primary location cannot be written the record is written once
    /// more into the backup area. Only when that also fails is
    /// [`PersistenceError::WriteFailed`] returned.
    pub fn write_site_config(
        &self,
        site: &str,
        config: &ModelConfiguration,
        artifacts: &DerivedArtifacts,
    ) -> Result<WriteOutcome, PersistenceError> {
        let record = SiteRecord::new(site, config.clone(), artifacts.clone());
        self.write_record(&record)
    }

    pub fn write_record(&self, record: &SiteRecord) -> Result<WriteOutcome, PersistenceError> {
        let stem = self.stem_for(&record.site)?;
        let yaml = serde_yaml_ng::to_string(record)?;

        match self.write_primary(&stem, &yaml) {
            Ok(path) => {
                self.prune_backups(&stem);
                tracing::info!(
                    "Saved configuration for site {} to {} ({} module(s), {} IO channel(s))",
                    record.site,
                    path,
                    record.config.len(),
                    record.io_count
                );
                Ok(WriteOutcome::Primary(path))
            }
            Err(primary) => {
                tracing::error!(
                    "Failed to write configuration for site {}: {}, retrying in backup area",
                    record.site,
                    primary
                );

                let fallback_path = self.next_backup_path(&stem);
                match fs::write(&fallback_path, &yaml) {
                    Ok(()) => {
                        tracing::warn!(
                            "Configuration for site {} written to fallback {}",
                            record.site,
                            fallback_path
                        );
                        Ok(WriteOutcome::Fallback(fallback_path))
                    }
                    Err(fallback) => {
                        tracing::error!(
                            "Fallback write for site {} failed: {}",
                            record.site,
                            fallback
                        );
                        Err(PersistenceError::WriteFailed {
                            site: record.site.clone(),
                            primary: primary.to_string(),
                            fallback: fallback.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Write to a temp file, rotate the current record out, then rename the
    /// temp file into place.
    fn write_primary(&self, stem: &str, yaml: &str) -> Result<Utf8PathBuf, PersistenceError> {
        fs::create_dir_all(&self.sites_dir).map_err(io_error(&self.sites_dir))?;

        let path = self.site_path(stem);
        let tmp = self.sites_dir.join(format!("{}.{}.tmp", stem, RECORD_EXT));

        fs::write(&tmp, yaml).map_err(io_error(&tmp))?;

        if path.is_file() {
            let backup = self.next_backup_path(stem);
            if let Err(e) = fs::rename(&path, &backup) {
                let _ = fs::remove_file(&tmp);
                return Err(PersistenceError::Io { path, source: e });
            }
            tracing::debug!("Rotated {} to {}", path, backup);
        }

        fs::rename(&tmp, &path).map_err(io_error(&tmp))?;
        Ok(path)
    }

    /// Read the current record for `site`. A missing file is `Ok(None)`;
    /// a malformed one is [`PersistenceError::Corrupt`] and stays on disk.
    pub fn read_site_config(&self, site: &str) -> Result<Option<SiteRecord>, PersistenceError> {
        let path = self.site_config_path(site)?;
        if !path.is_file() {
            return Ok(None);
        }
        self.read_record(&path).map(Some)
    }

    fn read_record(&self, path: &Utf8Path) -> Result<SiteRecord, PersistenceError> {
        let contents = fs::read_to_string(path).map_err(|e| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let record: SiteRecord =
            serde_yaml_ng::from_str(&contents).map_err(|e| PersistenceError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            "Loaded configuration for site {} from {} (saved {})",
            record.site,
            path,
            record.saved_at
        );
        Ok(record)
    }

    /// Names of every site with a current record, sorted.
    ///
    /// The name comes from the record itself; unreadable records fall back
    /// to their file stem.
    pub fn list_saved_sites(&self) -> Result<Vec<String>, PersistenceError> {
        let mut sites = Vec::new();

        for path in self.record_files()? {
            match self.read_record(&path) {
                Ok(record) => sites.push(record.site),
                Err(e) => {
                    tracing::warn!("{}", e);
                    if let Some(stem) = path.file_stem() {
                        sites.push(stem.to_string());
                    }
                }
            }
        }

        sites.sort();
        Ok(sites)
    }

    /// Every readable record, sorted by site name. Unreadable ones are
    /// skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<SiteRecord>, PersistenceError> {
        let mut records = Vec::new();
        for path in self.record_files()? {
            match self.read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping record: {}", e),
            }
        }
        records.sort_by(|a, b| a.site.cmp(&b.site));
        Ok(records)
    }

    fn record_files(&self) -> Result<Vec<Utf8PathBuf>, PersistenceError> {
        if !self.sites_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in self.sites_dir.read_dir_utf8().map_err(io_error(&self.sites_dir))? {
            let entry = entry.map_err(io_error(&self.sites_dir))?;
            let path = entry.path();
            if path.is_file() && path.extension() == Some(RECORD_EXT) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Backups of `site`, oldest first.
    pub fn list_backups(&self, site: &str) -> Result<Vec<BackupInfo>, PersistenceError> {
        let stem = self.stem_for(site)?;
        Ok(self.backups_for_stem(&stem))
    }

    fn backups_for_stem(&self, stem: &str) -> Vec<BackupInfo> {
        let Ok(entries) = self.backup_dir.read_dir_utf8() else {
            return Vec::new();
        };

        let mut backups: Vec<BackupInfo> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.parse_backup_name(entry.path()))
            .filter(|info| info.stem == stem)
            .collect();

        backups.sort_by_key(|b| b.seq);
        backups
    }

    fn parse_backup_name(&self, path: &Utf8Path) -> Option<BackupInfo> {
        let captures = self.backup_pattern.captures(path.file_name()?)?;
        let created = NaiveDateTime::parse_from_str(&captures[2], BACKUP_TIMESTAMP_FORMAT).ok()?;
        let seq = captures[3].parse().ok()?;

        Some(BackupInfo {
            path: path.to_path_buf(),
            stem: captures[1].to_string(),
            created,
            seq,
        })
    }

    fn next_backup_path(&self, stem: &str) -> Utf8PathBuf {
        let seq = self
            .backups_for_stem(stem)
            .last()
            .map(|b| b.seq + 1)
            .unwrap_or(1);
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT);
        self.backup_dir
            .join(format!("{}__{}__{}.{}", stem, timestamp, seq, RECORD_EXT))
    }

    fn prune_backups(&self, stem: &str) {
        let backups = self.backups_for_stem(stem);
        if backups.len() <= self.retention {
            return;
        }

        let excess = backups.len() - self.retention;
        for backup in backups.into_iter().take(excess) {
            match fs::remove_file(&backup.path) {
                Ok(()) => tracing::debug!("Pruned old backup {}", backup.path),
                Err(e) => tracing::warn!("Failed to prune backup {}: {}", backup.path, e),
            }
        }
    }

    /// Move the current record for `site` into the backup area.
    ///
    /// Returns the backup path, or `None` if the site had no record.
    pub fn archive_site_config(&self, site: &str) -> Result<Option<Utf8PathBuf>, PersistenceError> {
        let stem = self.stem_for(site)?;
        let path = self.site_path(&stem);
        if !path.is_file() {
            return Ok(None);
        }

        let backup = self.next_backup_path(&stem);
        fs::rename(&path, &backup).map_err(io_error(&path))?;
        self.prune_backups(&stem);

        tracing::info!("Archived configuration for site {} to {}", site, backup);
        Ok(Some(backup))
    }

    /// Write every readable record into one YAML bundle keyed by site name.
    /// Returns the number of sites exported.
    pub fn export_all<P: AsRef<Utf8Path>>(&self, path: P) -> Result<usize, PersistenceError> {
        let path = path.as_ref();
        let bundle: IndexMap<String, SiteRecord> = self
            .load_all()?
            .into_iter()
            .map(|record| (record.site.clone(), record))
            .collect();

        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let yaml = serde_yaml_ng::to_string(&bundle)?;
        fs::write(path, yaml).map_err(io_error(path))?;

        tracing::info!("Exported {} site configuration(s) to {}", bundle.len(), path);
        Ok(bundle.len())
    }

    /// Import records from the legacy JSON layout under `<root>/db/plc_configs`.
    pub fn migrate_legacy_layout(&self) -> Result<MigrationReport, PersistenceError> {
        legacy::migrate(self, &self.root.join(legacy::LEGACY_SOURCE_DIR))
    }

    fn legacy_archive_dir(&self) -> Utf8PathBuf {
        self.root.join(LEGACY_ARCHIVE_DIR)
    }
}
