//! Data models for the rack configuration engine.
//!
//! - [`Catalog`] / [`ModuleModel`]: the static registry of hardware module types
//! - [`SiteInventory`]: a site's model → quantity device inventory
//! - [`SitePool`] / [`ModuleInstance`] / [`InstanceId`]: per-load instance arenas
//! - [`SlotPosition`] and the two configuration forms (model-level and live)
//! - [`DerivedArtifacts`]: system info, channel addresses and IO count computed on apply
//!
//! Instance ids never leave the pool that minted them. Anything persisted or
//! cached uses [`ModelConfiguration`].

pub mod artifacts;
pub mod catalog;
pub mod configuration;
pub mod instance;
pub mod inventory;
pub mod slot;

pub use artifacts::{ChannelAddress, DerivedArtifacts, SystemInfo, SystemType};
pub use catalog::{
    Catalog, DP_MASTER_MODEL, LE_CPU_MODEL, ModelFlags, ModuleCategory, ModuleModel,
};
pub use configuration::{
    LiveConfiguration, ModelConfiguration, demand_by_model, model_configuration_from_pairs,
};
pub use instance::{InstanceId, ModuleInstance, SitePool};
pub use inventory::{DeviceRecord, SiteInventory};
pub use slot::{SlotParseError, SlotPosition};
