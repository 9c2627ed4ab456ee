use super::{PersistenceError, PersistenceStore, SiteRecord, io_error};
use crate::models::{DerivedArtifacts, model_configuration_from_pairs};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

/// Legacy layout, relative to the store root.
pub const LEGACY_SOURCE_DIR: &str = "db/plc_configs";

const LEGACY_PREFIX: &str = "plc_config_";
const LEGACY_FULL_SUFFIX: &str = ".full.json";

/// Legacy JSON record. Only the fields that survive into the current
/// layout are read.
#[derive(Debug, Deserialize)]
struct LegacyRecord {
    #[serde(default)]
    site_name: Option<String>,
    #[serde(default)]
    save_time: Option<String>,
    #[serde(default)]
    config: BTreeMap<String, String>,
    #[serde(default)]
    io_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub imported: Vec<String>,
    /// Sites that already had a current record; left untouched.
    pub skipped: Vec<String>,
    pub failed: Vec<(Utf8PathBuf, String)>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.imported.is_empty() && self.skipped.is_empty() && self.failed.is_empty()
    }
}

fn parse_save_time(raw: Option<&str>) -> chrono::DateTime<Utc> {
    raw.and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

fn read_legacy(path: &Utf8Path) -> Result<LegacyRecord, String> {
    let contents = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&contents).map_err(|e| e.to_string())
}

/// Move a legacy file into the archive directory, keeping its name.
fn archive(path: &Utf8Path, archive_dir: &Utf8Path) -> Result<(), PersistenceError> {
    let Some(name) = path.file_name() else {
        return Ok(());
    };
    let target = archive_dir.join(name);
    fs::rename(path, &target).map_err(io_error(path))?;
    tracing::debug!("Archived legacy file {} to {}", path, target);
    Ok(())
}

pub(super) fn migrate(
    store: &PersistenceStore,
    source_dir: &Utf8Path,
) -> Result<MigrationReport, PersistenceError> {
    let mut report = MigrationReport::default();

    if !source_dir.is_dir() {
        tracing::debug!("No legacy configuration directory at {}", source_dir);
        return Ok(report);
    }

    let mut basics = Vec::new();
    for entry in source_dir.read_dir_utf8().map_err(io_error(source_dir))? {
        let entry = entry.map_err(io_error(source_dir))?;
        let name = entry.file_name();
        if entry.path().is_file()
            && name.starts_with(LEGACY_PREFIX)
            && name.ends_with(".json")
            && !name.ends_with(LEGACY_FULL_SUFFIX)
        {
            basics.push(entry.path().to_path_buf());
        }
    }
    basics.sort();

    if basics.is_empty() {
        return Ok(report);
    }

    let archive_dir = store.legacy_archive_dir();
    fs::create_dir_all(&archive_dir).map_err(io_error(&archive_dir))?;

    for basic in basics {
        let Some(file_stem) = basic.file_stem() else {
            continue;
        };
        let stem = file_stem
            .strip_prefix(LEGACY_PREFIX)
            .unwrap_or(file_stem)
            .to_string();
        let full = source_dir.join(format!("{}{}{}", LEGACY_PREFIX, stem, LEGACY_FULL_SUFFIX));

        // The full record carries everything the basic one does
        let source = if full.is_file() { &full } else { &basic };
        let legacy = match read_legacy(source) {
            Ok(legacy) => legacy,
            Err(reason) => {
                tracing::warn!("Cannot import legacy record {}: {}", source, reason);
                report.failed.push((source.clone(), reason));
                continue;
            }
        };

        let site = legacy
            .site_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| stem.clone());

        if store.has_site_config(&site) {
            tracing::info!("Site {} already has a record, legacy copy left in place", site);
            report.skipped.push(site);
            continue;
        }

        let record = SiteRecord {
            saved_at: parse_save_time(legacy.save_time.as_deref()),
            io_count: legacy.io_count,
            ..SiteRecord::new(
                &site,
                model_configuration_from_pairs(legacy.config),
                DerivedArtifacts::default(),
            )
        };

        if let Err(e) = store.write_record(&record) {
            tracing::warn!("Failed to import legacy record for site {}: {}", site, e);
            report.failed.push((basic.clone(), e.to_string()));
            continue;
        }

        archive(&basic, &archive_dir)?;
        if full.is_file() {
            archive(&full, &archive_dir)?;
        }

        tracing::info!(
            "Imported legacy configuration for site {} ({} module(s))",
            site,
            record.config.len()
        );
        report.imported.push(site);
    }

    tracing::info!(
        "Legacy migration: {} imported, {} skipped, {} failed",
        report.imported.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}
