use crate::models::{
    InstanceId, LiveConfiguration, ModelConfiguration, SitePool, SlotPosition, demand_by_model,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Non-fatal reconciliation outcome. Slots affected are left unassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconcileWarning {
    /// Fewer instances of `model` exist than the configuration asks for.
    PartialReservation {
        model: String,
        requested: usize,
        actual: usize,
    },
    /// No reserved instance was left for this slot.
    UnresolvedSlot { slot: SlotPosition, model: String },
    /// The slot no longer exists in the site's rack topology.
    SlotOutsideTopology { slot: SlotPosition, model: String },
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartialReservation {
                model,
                requested,
                actual,
            } => write!(
                f,
                "model {}: configuration needs {} instance(s), only {} available",
                model, requested, actual
            ),
            Self::UnresolvedSlot { slot, model } => {
                write!(f, "slot {} left unassigned: no instance of {} remaining", slot, model)
            }
            Self::SlotOutsideTopology { slot, model } => {
                write!(f, "slot {} ({}) dropped: outside the current racks", slot, model)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub configuration: LiveConfiguration,
    /// Pool instances not bound to any slot, in arena order.
    pub available: Vec<InstanceId>,
    pub warnings: Vec<ReconcileWarning>,
}

/// Re-bind a model-level configuration to a freshly minted pool.
///
/// Runs in three passes that must stay in this order:
///
/// 1. tally how many slots ask for each model;
/// 2. reserve, per model, that many instances ascending by ordinal;
/// 3. walk the slots rack then slot ascending, popping from the model's
///    reservation bucket.
///
/// Whatever was not popped is available. Every pool instance ends up in
/// exactly one of the two sides regardless of how many share a model.
pub fn reconcile(persisted: &ModelConfiguration, pool: &SitePool) -> Reconciliation {
    let mut warnings = Vec::new();

    let demand = demand_by_model(persisted);

    let mut buckets: HashMap<String, VecDeque<InstanceId>> = HashMap::with_capacity(demand.len());
    for (model, &requested) in &demand {
        let mut candidates: Vec<_> = pool.instances_of(model).collect();
        candidates.sort_by_key(|i| i.ordinal);

        let bucket: VecDeque<InstanceId> =
            candidates.iter().take(requested).map(|i| i.id).collect();

        if bucket.len() < requested {
            tracing::warn!(
                "Site {}: {} needs {} instance(s), pool has {}",
                pool.site(),
                model,
                requested,
                bucket.len()
            );
            warnings.push(ReconcileWarning::PartialReservation {
                model: model.clone(),
                requested,
                actual: bucket.len(),
            });
        }

        buckets.insert(model.clone(), bucket);
    }

    let mut configuration = LiveConfiguration::new();
    for (slot, model) in persisted {
        let key = model.trim().to_ascii_uppercase();
        match buckets.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(id) => {
                configuration.insert(*slot, id);
            }
            None => {
                tracing::warn!("Site {}: slot {} ({}) unresolved", pool.site(), slot, key);
                warnings.push(ReconcileWarning::UnresolvedSlot { slot: *slot, model: key });
            }
        }
    }

    let allocated: HashSet<InstanceId> = configuration.values().copied().collect();
    let available = pool
        .instances()
        .iter()
        .map(|i| i.id)
        .filter(|id| !allocated.contains(id))
        .collect();

    tracing::debug!(
        "Reconciled {} slot(s) for site {} with {} warning(s)",
        configuration.len(),
        pool.site(),
        warnings.len()
    );

    Reconciliation {
        configuration,
        available,
        warnings,
    }
}

/// Strip instance identity from a live configuration.
///
/// Slots bound to ids foreign to `pool` are dropped.
pub fn to_model_configuration(live: &LiveConfiguration, pool: &SitePool) -> ModelConfiguration {
    live.iter()
        .filter_map(|(slot, id)| pool.get(*id).map(|i| (*slot, i.model_id().to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModuleModel;
    use std::sync::Arc;

    fn pool(rows: &[(&str, u32)]) -> SitePool {
        SitePool::mint(
            "S1",
            rows.iter()
                .map(|(m, q)| (Arc::new(ModuleModel::unclassified(m)), *q)),
        )
    }

    fn config(entries: &[((u16, u16), &str)]) -> ModelConfiguration {
        entries
            .iter()
            .map(|((r, s), m)| (SlotPosition::new(*r, *s), m.to_string()))
            .collect()
    }

    #[test]
    fn test_duplicates_fully_allocated() {
        let pool = pool(&[("M1", 4)]);
        let persisted = config(&[((1, 2), "M1"), ((1, 3), "M1"), ((1, 4), "M1"), ((1, 5), "M1")]);

        let result = reconcile(&persisted, &pool);

        assert_eq!(result.configuration.len(), 4);
        assert!(result.available.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_reservation_takes_lowest_ordinals_in_slot_order() {
        let pool = pool(&[("M1", 4)]);
        let persisted = config(&[((2, 3), "M1"), ((1, 5), "M1")]);

        let result = reconcile(&persisted, &pool);

        let first = pool.get(result.configuration[&SlotPosition::new(1, 5)]).unwrap();
        let second = pool.get(result.configuration[&SlotPosition::new(2, 3)]).unwrap();
        assert_eq!(first.ordinal, 0);
        assert_eq!(second.ordinal, 1);

        let remaining: Vec<u32> = result
            .available
            .iter()
            .map(|id| pool.get(*id).unwrap().ordinal)
            .collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn test_shortage_warns_and_leaves_slots_empty() {
        let pool = pool(&[("M1", 1)]);
        let persisted = config(&[((1, 2), "M1"), ((1, 3), "M1"), ((1, 4), "M4")]);

        let result = reconcile(&persisted, &pool);

        assert_eq!(result.configuration.len(), 1);
        assert!(result.configuration.contains_key(&SlotPosition::new(1, 2)));
        assert!(result.available.is_empty());
        assert_eq!(
            result.warnings,
            vec![
                ReconcileWarning::PartialReservation {
                    model: "M1".to_string(),
                    requested: 2,
                    actual: 1
                },
                ReconcileWarning::PartialReservation {
                    model: "M4".to_string(),
                    requested: 1,
                    actual: 0
                },
                ReconcileWarning::UnresolvedSlot {
                    slot: SlotPosition::new(1, 3),
                    model: "M1".to_string()
                },
                ReconcileWarning::UnresolvedSlot {
                    slot: SlotPosition::new(1, 4),
                    model: "M4".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_model_match_ignores_case() {
        let pool = pool(&[("LK411", 1)]);
        let persisted = config(&[((1, 2), "lk411")]);

        let result = reconcile(&persisted, &pool);
        assert_eq!(result.configuration.len(), 1);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_warnings_name_missing_model_consistently() {
        let pool = pool(&[("M1", 1)]);
        let persisted = config(&[((1, 2), " lk999 ")]);

        let result = reconcile(&persisted, &pool);
        assert_eq!(
            result.warnings,
            vec![
                ReconcileWarning::PartialReservation {
                    model: "LK999".to_string(),
                    requested: 1,
                    actual: 0
                },
                ReconcileWarning::UnresolvedSlot {
                    slot: SlotPosition::new(1, 2),
                    model: "LK999".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_to_model_configuration_round_trip() {
        let pool = pool(&[("M1", 2), ("M2", 1)]);
        let persisted = config(&[((1, 2), "M2"), ((1, 3), "M1")]);

        let result = reconcile(&persisted, &pool);
        assert_eq!(to_model_configuration(&result.configuration, &pool), persisted);
    }
}
