//! Services module - the assignment engine proper.
//!
//! Pure logic over the data models, with no I/O and no shared state:
//!
//! - [`PoolBuilder`]: mints a [`SitePool`](crate::models::SitePool) from a site inventory
//!   under a [`FilterPolicy`]
//! - [`RackTopology`]: addressable positions, reserved slots and auto placements
//! - [`reconcile`]: re-binds a model-level configuration to a fresh pool
//! - [`SitePartition`]: the live available/configured split with `assign` / `unassign`
//! - [`derive_artifacts`]: system info, channel addresses and IO count for apply
//!
//! The session layer in [`crate::state`] owns these values and sequences them.

pub mod addressing;
pub mod assignment;
pub mod pool_builder;
pub mod reconcile;
pub mod topology;

pub use addressing::{derive_artifacts, generate_channel_addresses};
pub use assignment::{AssignError, PartitionViolation, SitePartition};
pub use pool_builder::{FilterPolicy, PoolBuild, PoolBuilder, PoolWarning};
pub use reconcile::{ReconcileWarning, Reconciliation, reconcile, to_model_configuration};
pub use topology::{DEFAULT_SLOTS_PER_RACK, RackTopology};
