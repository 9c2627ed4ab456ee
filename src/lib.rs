// rackcfg - PLC rack module assignment and per-site configuration cache
//
// This is the library crate containing the engine: catalog, pool building,
// reconciliation, the configuration cache and persistence.
// The binary crate (main.rs) provides the command-line entry point.

pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod settings;
pub mod state;
pub mod store;

// Re-export commonly used types for convenience
pub use metrics::EngineMetrics;
pub use models::{Catalog, InstanceId, ModelConfiguration, SiteInventory, SlotPosition};
pub use settings::{EngineSettings, SettingsManager};
pub use state::{ConfigurationCache, ProjectSession, SessionError, SessionEvent};
pub use store::PersistenceStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
