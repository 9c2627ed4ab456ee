//! rackcfg - PLC rack module assignment tool
//!
//! Command-line entry point over the engine library. Settings come from
//! `rackcfg.yaml` next to the executable plus `RACKCFG_*` environment
//! variables; persistent data is anchored to the executable's directory.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use rackcfg::logging::{self, ConsoleOutput};
use rackcfg::models::SiteInventory;
use rackcfg::settings::{SettingsManager, paths};
use rackcfg::{APP_NAME, ProjectSession, VERSION};
use std::fs;

#[derive(Parser)]
#[command(name = "rackcfg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override the persistence directory (relative paths follow the
    /// working directory)
    #[arg(long, global = true, env = "RACKCFG_DATA_DIR")]
    data_dir: Option<Utf8PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Also log to stderr as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sites with a saved configuration
    Sites,

    /// List backups of one site's configuration, oldest first
    Backups { site: String },

    /// Import configurations from the legacy JSON layout
    Migrate,

    /// Load a site's inventory and show its restored partition
    Show {
        site: String,

        /// YAML map of model -> quantity
        #[arg(short, long)]
        inventory: Utf8PathBuf,
    },

    /// Write every saved configuration into one YAML bundle
    Export { output: Utf8PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let install_dir = paths::install_dir()?;
    let mut settings = SettingsManager::new(&install_dir).load()?;
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = Some(paths::from_working_dir(data_dir)?.to_string());
    }
    settings.debug |= cli.debug;

    let console = if cli.json_logs {
        ConsoleOutput::Json
    } else {
        ConsoleOutput::Off
    };
    let log_dir = settings.resolve_log_dir(&install_dir);
    let _guard =
        logging::setup_logging_with_console(log_dir.as_str(), "rackcfg", settings.debug, console)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let mut session = ProjectSession::from_settings(&settings, &install_dir)?;

    match cli.command {
        Commands::Sites => {
            for site in session.store().list_saved_sites()? {
                println!("{}", site);
            }
        }
        Commands::Backups { site } => {
            for backup in session.store().list_backups(&site)? {
                println!("{:>4}  {}  {}", backup.seq, backup.created, backup.path);
            }
        }
        Commands::Migrate => {
            let report = session.store().migrate_legacy_layout()?;
            println!(
                "imported {}, skipped {}, failed {}",
                report.imported.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for (path, reason) in &report.failed {
                println!("  failed: {}: {}", path, reason);
            }
        }
        Commands::Show { site, inventory } => {
            let contents = fs::read_to_string(&inventory)
                .with_context(|| format!("Failed to read inventory: {}", inventory))?;
            let inventory: SiteInventory = serde_yaml_ng::from_str(&contents)
                .with_context(|| format!("Failed to parse inventory: {}", inventory))?;

            let _ = session.current_site(&site);
            let report = session.load_inventory(&inventory)?;

            println!("site: {} ({:?})", report.site, report.source);
            for warning in &report.pool_warnings {
                println!("  warning: {}", warning);
            }
            for warning in &report.reconcile_warnings {
                println!("  warning: {}", warning);
            }

            println!("configured:");
            for (slot, instance) in session.configured_slots(&site)? {
                println!("  {:>6}  {}", slot.to_string(), instance.key());
            }
            println!("available:");
            for instance in session.available_instances(&site)? {
                println!("  {}", instance.key());
            }

            if let Ok(artifacts) = session.derived_system_info(&site) {
                println!(
                    "system: {} x{} rack(s), {} module(s), {} IO channel(s)",
                    artifacts.system_info.system_type,
                    artifacts.system_info.rack_count,
                    artifacts.system_info.module_count,
                    artifacts.io_count
                );
            }
        }
        Commands::Export { output } => {
            let count = session.store().export_all(&output)?;
            println!("exported {} site(s) to {}", count, output);
        }
    }

    session.metrics().log_summary();
    Ok(())
}
