//! Integration tests for layered engine settings
//!
//! File values override defaults and `RACKCFG_*` variables override the
//! file. The environment is passed explicitly so tests stay independent of
//! the process environment.

use camino::Utf8PathBuf;
use rackcfg::settings::{EngineSettings, SettingsManager};
use std::fs;
use tempfile::TempDir;

fn create_test_settings_manager() -> (SettingsManager, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (SettingsManager::new(&dir), temp_dir)
}

fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
    let mut map = config::Map::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v.to_string());
    }
    Some(map)
}

#[test]
fn test_save_and_reload() {
    let (manager, _temp_dir) = create_test_settings_manager();

    let settings = EngineSettings {
        data_dir: Some("plc-data".to_string()),
        backup_retention: 3,
        require_catalog_membership: true,
        ..Default::default()
    };
    manager.save(&settings).unwrap();

    let loaded = manager.load_with_env(env(&[])).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let (manager, _temp_dir) = create_test_settings_manager();
    fs::write(manager.settings_path(), "backup_retention: 4\n").unwrap();

    let loaded = manager.load_with_env(env(&[])).unwrap();

    assert_eq!(loaded.backup_retention, 4);
    assert_eq!(loaded.log_dir, "logs");
    assert!(!loaded.restrict_site_pools_to_browse_set);
}

#[test]
fn test_environment_overrides_file() {
    let (manager, _temp_dir) = create_test_settings_manager();
    fs::write(
        manager.settings_path(),
        "backup_retention: 4\nrestrict_site_pools_to_browse_set: false\n",
    )
    .unwrap();

    let loaded = manager
        .load_with_env(env(&[
            ("RACKCFG_BACKUP_RETENTION", "7"),
            ("RACKCFG_RESTRICT_SITE_POOLS_TO_BROWSE_SET", "true"),
            ("RACKCFG_DEBUG", "true"),
        ]))
        .unwrap();

    assert_eq!(loaded.backup_retention, 7);
    assert!(loaded.restrict_site_pools_to_browse_set);
    assert!(loaded.debug);
    assert!(loaded.filter_policy().restrict_to_browse_set);
}

#[test]
fn test_malformed_file_is_an_error() {
    let (manager, _temp_dir) = create_test_settings_manager();
    fs::write(manager.settings_path(), "backup_retention: [not a number\n").unwrap();

    assert!(manager.load_with_env(env(&[])).is_err());
}
