//! Property tests for reconciliation
//!
//! Random pools and persisted configurations, checked for:
//! - conservation of instances per model
//! - disjoint available/configured sides
//! - stable slot → model bindings across a pool rebuild
//! - reservation by ascending ordinal

use proptest::prelude::*;
use rackcfg::models::{ModelConfiguration, ModuleModel, SitePool, SlotPosition};
use rackcfg::services::{reconcile, to_model_configuration};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const MODELS: &[&str] = &["M0", "M1", "M2", "M3", "M4"];

fn pool_from(quantities: &[u32]) -> SitePool {
    SitePool::mint(
        "prop",
        MODELS
            .iter()
            .zip(quantities)
            .map(|(m, q)| (Arc::new(ModuleModel::unclassified(m)), *q)),
    )
}

fn quantities() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..6, MODELS.len())
}

/// Up to 24 distinct slots over 3 racks, each naming one of the models.
fn persisted() -> impl Strategy<Value = ModelConfiguration> {
    prop::collection::btree_map(
        (1u16..=3, 2u16..=11).prop_map(|(r, s)| SlotPosition::new(r, s)),
        (0..MODELS.len()).prop_map(|i| MODELS[i].to_string()),
        0..24,
    )
}

proptest! {
    #[test]
    fn conservation_holds_per_model(q in quantities(), cfg in persisted()) {
        let pool = pool_from(&q);
        let result = reconcile(&cfg, &pool);

        for model in MODELS {
            let available = result
                .available
                .iter()
                .filter(|id| pool.get(**id).unwrap().model_id() == *model)
                .count();
            let configured = result
                .configuration
                .values()
                .filter(|id| pool.get(**id).unwrap().model_id() == *model)
                .count();
            prop_assert_eq!(available + configured, pool.count_of(model));
        }
    }

    #[test]
    fn sides_are_disjoint(q in quantities(), cfg in persisted()) {
        let pool = pool_from(&q);
        let result = reconcile(&cfg, &pool);

        let configured: HashSet<_> = result.configuration.values().copied().collect();
        prop_assert_eq!(configured.len(), result.configuration.len());
        for id in &result.available {
            prop_assert!(!configured.contains(id));
        }
        prop_assert_eq!(configured.len() + result.available.len(), pool.len());
    }

    #[test]
    fn bindings_survive_rebuild(q in quantities(), cfg in persisted()) {
        let pool = pool_from(&q);
        let first = reconcile(&cfg, &pool);
        let saved = to_model_configuration(&first.configuration, &pool);

        let rebuilt = pool.rebuild();
        let second = reconcile(&saved, &rebuilt);

        prop_assert!(second.warnings.is_empty());
        prop_assert_eq!(to_model_configuration(&second.configuration, &rebuilt), saved);

        let ordinals = |r: &rackcfg::services::Reconciliation, p: &SitePool| -> BTreeMap<SlotPosition, u32> {
            r.configuration.iter().map(|(s, id)| (*s, p.get(*id).unwrap().ordinal)).collect()
        };
        prop_assert_eq!(ordinals(&first, &pool), ordinals(&second, &rebuilt));
    }

    #[test]
    fn lowest_ordinals_are_reserved_in_slot_order(q in quantities(), cfg in persisted()) {
        let pool = pool_from(&q);
        let result = reconcile(&cfg, &pool);

        let mut next: BTreeMap<&str, u32> = BTreeMap::new();
        for id in result.configuration.values() {
            let instance = pool.get(*id).unwrap();
            let expected = next.entry(instance.model_id()).or_insert(0);
            prop_assert_eq!(instance.ordinal, *expected);
            *expected += 1;
        }
    }

    #[test]
    fn unresolved_slots_match_shortfall(q in quantities(), cfg in persisted()) {
        let pool = pool_from(&q);
        let result = reconcile(&cfg, &pool);

        let resolved = result.configuration.len();
        let unresolved = result
            .warnings
            .iter()
            .filter(|w| matches!(w, rackcfg::services::ReconcileWarning::UnresolvedSlot { .. }))
            .count();
        prop_assert_eq!(resolved + unresolved, cfg.len());
    }
}
