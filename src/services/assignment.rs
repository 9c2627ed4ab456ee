use crate::models::{
    InstanceId, LiveConfiguration, ModelConfiguration, ModuleInstance, SitePool, SlotPosition,
};
use crate::services::reconcile::{ReconcileWarning, reconcile, to_model_configuration};
use crate::services::topology::RackTopology;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignError {
    #[error("slot {slot} is already bound to instance {bound}")]
    SlotOccupied { slot: SlotPosition, bound: InstanceId },

    #[error("instance {0} is not available")]
    InstanceAlreadyConfigured(InstanceId),

    #[error("instance {0} does not belong to this site's pool")]
    UnknownInstance(InstanceId),

    #[error("slot {0} is outside the rack topology")]
    SlotOutOfRange(SlotPosition),

    #[error("slot {0} is reserved for an auto-placed module")]
    ReservedSlot(SlotPosition),
}

/// A broken partition invariant, reported by [`SitePartition::verify`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionViolation {
    #[error("instance {0} is both available and configured")]
    BothSides(InstanceId),

    #[error("instance {0} is neither available nor configured")]
    Orphaned(InstanceId),

    #[error("instance {0} is bound to more than one slot")]
    DoubleBound(InstanceId),

    #[error("instance {0} is not part of the pool")]
    Foreign(InstanceId),
}

/// Live available/configured split of one site's pool.
///
/// Every instance of the pool sits on exactly one side. All mutation goes
/// through [`assign`](Self::assign) and [`unassign`](Self::unassign), which
/// move an instance across as a single step.
#[derive(Debug, Clone)]
pub struct SitePartition {
    pool: SitePool,
    topology: RackTopology,
    configured: LiveConfiguration,
    available: BTreeSet<InstanceId>,
}

impl SitePartition {
    /// Everything available, nothing configured.
    pub fn fresh(pool: SitePool, topology: RackTopology) -> Self {
        let available = pool.instances().iter().map(|i| i.id).collect();
        Self {
            pool,
            topology,
            configured: LiveConfiguration::new(),
            available,
        }
    }

    /// Restore a persisted configuration against `pool`.
    ///
    /// Entries on reserved positions belong to the topology and are not fed
    /// to reconciliation. Entries outside the topology are dropped with a
    /// warning ahead of the reconciliation warnings.
    pub fn from_reconciliation(
        pool: SitePool,
        topology: RackTopology,
        persisted: &ModelConfiguration,
    ) -> (Self, Vec<ReconcileWarning>) {
        let mut warnings = Vec::new();
        let mut user_entries = ModelConfiguration::new();

        for (slot, model) in persisted {
            if !topology.contains(*slot) {
                tracing::warn!(
                    "Site {}: slot {} ({}) outside {} rack(s), dropping",
                    pool.site(),
                    slot,
                    model,
                    topology.rack_count
                );
                warnings.push(ReconcileWarning::SlotOutsideTopology {
                    slot: *slot,
                    model: model.trim().to_ascii_uppercase(),
                });
            } else if !topology.is_reserved(*slot) {
                user_entries.insert(*slot, model.clone());
            }
        }

        let result = reconcile(&user_entries, &pool);
        warnings.extend(result.warnings);

        let partition = Self {
            pool,
            topology,
            configured: result.configuration,
            available: result.available.into_iter().collect(),
        };
        (partition, warnings)
    }

    pub fn assign(&mut self, slot: SlotPosition, instance: InstanceId) -> Result<(), AssignError> {
        if !self.pool.contains(instance) {
            return Err(AssignError::UnknownInstance(instance));
        }
        if !self.topology.contains(slot) {
            return Err(AssignError::SlotOutOfRange(slot));
        }
        if self.topology.is_reserved(slot) {
            return Err(AssignError::ReservedSlot(slot));
        }
        if let Some(bound) = self.configured.get(&slot) {
            return Err(AssignError::SlotOccupied { slot, bound: *bound });
        }
        if !self.available.remove(&instance) {
            return Err(AssignError::InstanceAlreadyConfigured(instance));
        }

        self.configured.insert(slot, instance);
        tracing::debug!("Assigned {} to slot {} at {}", instance, slot, self.pool.site());
        Ok(())
    }

    /// Release the instance bound at `slot`. Empty slots are a no-op.
    pub fn unassign(&mut self, slot: SlotPosition) -> Option<InstanceId> {
        let released = self.configured.remove(&slot)?;
        self.available.insert(released);
        tracing::debug!("Released {} from slot {} at {}", released, slot, self.pool.site());
        Some(released)
    }

    /// Available instances in arena order (model ascending, then ordinal).
    pub fn available_instances(&self) -> Vec<&ModuleInstance> {
        self.available
            .iter()
            .filter_map(|id| self.pool.get(*id))
            .collect()
    }

    pub fn configured_instances(&self) -> BTreeMap<SlotPosition, &ModuleInstance> {
        self.configured
            .iter()
            .filter_map(|(slot, id)| self.pool.get(*id).map(|i| (*slot, i)))
            .collect()
    }

    pub fn configuration(&self) -> &LiveConfiguration {
        &self.configured
    }

    /// User assignments as slot → model.
    pub fn model_configuration(&self) -> ModelConfiguration {
        to_model_configuration(&self.configured, &self.pool)
    }

    /// User assignments plus the topology's auto-placed modules.
    pub fn applied_configuration(&self) -> ModelConfiguration {
        let mut config = self.model_configuration();
        for (slot, model) in self.topology.auto_placements() {
            config.insert(slot, model.to_string());
        }
        config
    }

    pub fn is_available(&self, instance: InstanceId) -> bool {
        self.available.contains(&instance)
    }

    pub fn pool(&self) -> &SitePool {
        &self.pool
    }

    pub fn topology(&self) -> &RackTopology {
        &self.topology
    }

    /// Check exclusivity and conservation over the whole pool.
    pub fn verify(&self) -> Result<(), PartitionViolation> {
        let mut bound = HashSet::with_capacity(self.configured.len());
        for id in self.configured.values() {
            if !self.pool.contains(*id) {
                return Err(PartitionViolation::Foreign(*id));
            }
            if !bound.insert(*id) {
                return Err(PartitionViolation::DoubleBound(*id));
            }
            if self.available.contains(id) {
                return Err(PartitionViolation::BothSides(*id));
            }
        }

        for id in &self.available {
            if !self.pool.contains(*id) {
                return Err(PartitionViolation::Foreign(*id));
            }
        }

        for instance in self.pool.instances() {
            if !bound.contains(&instance.id) && !self.available.contains(&instance.id) {
                return Err(PartitionViolation::Orphaned(instance.id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModuleModel, SystemType};
    use std::sync::Arc;

    fn partition(rows: &[(&str, u32)]) -> SitePartition {
        let pool = SitePool::mint(
            "S1",
            rows.iter()
                .map(|(m, q)| (Arc::new(ModuleModel::unclassified(m)), *q)),
        );
        SitePartition::fresh(pool, RackTopology::new(SystemType::Lk, 1))
    }

    #[test]
    fn test_assign_moves_instance_across() {
        let mut partition = partition(&[("M1", 2)]);
        let id = partition.available_instances()[0].id;

        partition.assign(SlotPosition::new(1, 2), id).unwrap();

        assert!(!partition.is_available(id));
        assert_eq!(partition.available_instances().len(), 1);
        assert_eq!(partition.configuration()[&SlotPosition::new(1, 2)], id);
        partition.verify().unwrap();
    }

    #[test]
    fn test_assign_rejects_occupied_slot() {
        let mut partition = partition(&[("M1", 2)]);
        let ids: Vec<_> = partition.available_instances().iter().map(|i| i.id).collect();

        partition.assign(SlotPosition::new(1, 2), ids[0]).unwrap();
        let err = partition.assign(SlotPosition::new(1, 2), ids[1]).unwrap_err();

        assert_eq!(
            err,
            AssignError::SlotOccupied {
                slot: SlotPosition::new(1, 2),
                bound: ids[0]
            }
        );
        assert!(partition.is_available(ids[1]));
    }

    #[test]
    fn test_assign_rejects_configured_instance() {
        let mut partition = partition(&[("M1", 1)]);
        let id = partition.available_instances()[0].id;

        partition.assign(SlotPosition::new(1, 2), id).unwrap();
        let err = partition.assign(SlotPosition::new(1, 3), id).unwrap_err();

        assert_eq!(err, AssignError::InstanceAlreadyConfigured(id));
    }

    #[test]
    fn test_assign_guards_topology() {
        let mut partition = partition(&[("M1", 1)]);
        let id = partition.available_instances()[0].id;

        assert_eq!(
            partition.assign(SlotPosition::new(1, 1), id),
            Err(AssignError::ReservedSlot(SlotPosition::new(1, 1)))
        );
        assert_eq!(
            partition.assign(SlotPosition::new(3, 2), id),
            Err(AssignError::SlotOutOfRange(SlotPosition::new(3, 2)))
        );
    }

    #[test]
    fn test_assign_rejects_foreign_instance() {
        let mut first = partition(&[("M1", 1)]);
        let second = partition(&[("M1", 1)]);
        let foreign = second.available_instances()[0].id;

        assert_eq!(
            first.assign(SlotPosition::new(1, 2), foreign),
            Err(AssignError::UnknownInstance(foreign))
        );
    }

    #[test]
    fn test_unassign_is_noop_on_empty_slot() {
        let mut partition = partition(&[("M1", 1)]);
        assert_eq!(partition.unassign(SlotPosition::new(1, 5)), None);

        let id = partition.available_instances()[0].id;
        partition.assign(SlotPosition::new(1, 5), id).unwrap();
        assert_eq!(partition.unassign(SlotPosition::new(1, 5)), Some(id));
        assert!(partition.is_available(id));
        partition.verify().unwrap();
    }

    #[test]
    fn test_restore_skips_reserved_entries() {
        let pool = SitePool::mint("S1", [(Arc::new(ModuleModel::unclassified("M1")), 2)]);
        let mut persisted = ModelConfiguration::new();
        persisted.insert(SlotPosition::new(1, 1), "PROFIBUS-DP".to_string());
        persisted.insert(SlotPosition::new(1, 2), "M1".to_string());

        let (partition, warnings) =
            SitePartition::from_reconciliation(pool, RackTopology::new(SystemType::Lk, 1), &persisted);

        assert!(warnings.is_empty());
        assert_eq!(partition.configuration().len(), 1);
        assert_eq!(partition.available_instances().len(), 1);

        let applied = partition.applied_configuration();
        assert_eq!(applied[&SlotPosition::new(1, 1)], "PROFIBUS-DP");
        assert_eq!(applied[&SlotPosition::new(1, 2)], "M1");
    }

    #[test]
    fn test_restore_drops_entries_on_removed_racks() {
        let pool = SitePool::mint("S1", [(Arc::new(ModuleModel::unclassified("M1")), 1)]);
        let mut persisted = ModelConfiguration::new();
        persisted.insert(SlotPosition::new(1, 1), "PROFIBUS-DP".to_string());
        persisted.insert(SlotPosition::new(2, 1), "PROFIBUS-DP".to_string());
        persisted.insert(SlotPosition::new(2, 3), "M1".to_string());

        let (partition, warnings) =
            SitePartition::from_reconciliation(pool, RackTopology::new(SystemType::Lk, 1), &persisted);

        assert_eq!(
            warnings,
            vec![
                ReconcileWarning::SlotOutsideTopology {
                    slot: SlotPosition::new(2, 1),
                    model: "PROFIBUS-DP".to_string()
                },
                ReconcileWarning::SlotOutsideTopology {
                    slot: SlotPosition::new(2, 3),
                    model: "M1".to_string()
                },
            ]
        );
        assert!(partition.configuration().is_empty());
        assert_eq!(partition.available_instances().len(), 1);
        partition.verify().unwrap();

        let applied = partition.applied_configuration();
        assert_eq!(applied.len(), 1);
        assert!(applied.contains_key(&SlotPosition::new(1, 1)));
    }
}
