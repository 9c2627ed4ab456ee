// State management module
//
// Owns everything that outlives a single engine call: the per-site
// configuration cache and the project session that sequences pool builds,
// restores, edits and applies, emitting change events as it goes.

pub mod cache;
pub mod session;

pub use cache::{CacheEntry, CacheError, ConfigurationCache};
pub use session::{
    ApplyOutcome, ClearReport, InventorySource, LoadReport, ProjectSession, RestoreSource,
    SessionError,
};

use crate::models::{InstanceId, SlotPosition};

/// Change events emitted by [`ProjectSession`].
///
/// Sent on a tokio broadcast channel; a send with no subscribers is not an
/// error.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A site became the active one
    SiteActivated { site: String, cached: bool },

    /// A site's pool was minted from a fresh inventory load
    PoolRebuilt {
        site: String,
        instances: usize,
        source: RestoreSource,
    },

    /// A cached configuration was reconciled onto the new pool
    ConfigurationRestored {
        site: String,
        configured: usize,
        warnings: usize,
    },

    InstanceAssigned {
        site: String,
        slot: SlotPosition,
        instance: InstanceId,
    },

    InstanceUnassigned {
        site: String,
        slot: SlotPosition,
        instance: InstanceId,
    },

    /// Configuration persisted and cached
    ConfigurationApplied {
        site: String,
        modules: usize,
        io_count: usize,
        fallback: bool,
    },

    /// Cache dropped, sites unloaded
    ProjectCleared { sites: usize, archived: usize },
}
