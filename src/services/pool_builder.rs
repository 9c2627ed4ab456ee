use crate::models::{Catalog, ModuleModel, SiteInventory, SitePool};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Which models a site-derived pool admits.
///
/// Structurally special models (racks, CPUs, bus masters) are always
/// excluded; they are placed by the rack topology instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Drop models outside the curated library browse set.
    #[serde(default)]
    pub restrict_to_browse_set: bool,
    /// Drop models absent from the catalog, reporting each as a warning.
    #[serde(default)]
    pub require_catalog_membership: bool,
}

/// A model was skipped during pool build; the rest of the pool is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PoolWarning {
    UnknownModel { model: String, quantity: u32 },
}

impl fmt::Display for PoolWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModel { model, quantity } => {
                write!(f, "model {} (x{}) is not in the module catalog", model, quantity)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolBuild {
    pub pool: SitePool,
    pub warnings: Vec<PoolWarning>,
    /// Models left out of the pool by policy, with their quantities.
    pub excluded: Vec<(String, u32)>,
}

/// Mints site pools from device inventories.
pub struct PoolBuilder<'a> {
    catalog: &'a Catalog,
    policy: FilterPolicy,
}

impl<'a> PoolBuilder<'a> {
    pub fn new(catalog: &'a Catalog, policy: FilterPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Build the pool for `site`.
    ///
    /// Models are minted in ascending order of their uppercased identifier,
    /// so two builds from the same inventory produce the same arena layout.
    /// Inventory rows differing only in case are merged.
    pub fn build(&self, site: &str, inventory: &SiteInventory) -> PoolBuild {
        let mut admitted: BTreeMap<String, (Arc<ModuleModel>, u32)> = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut excluded = Vec::new();

        for (model_id, &quantity) in inventory {
            if quantity == 0 {
                continue;
            }

            let known = self.catalog.contains(model_id);
            if !known && self.policy.require_catalog_membership {
                tracing::warn!(
                    "Site {}: model {} not in catalog, skipping {} unit(s)",
                    site,
                    model_id,
                    quantity
                );
                warnings.push(PoolWarning::UnknownModel {
                    model: model_id.clone(),
                    quantity,
                });
                continue;
            }

            let model = self.catalog.classify(model_id);
            if model.is_structurally_special() {
                tracing::debug!(
                    "Site {}: {} ({}) is placed by topology, not pooled",
                    site,
                    model.id,
                    model.category
                );
                excluded.push((model.id.clone(), quantity));
                continue;
            }

            if self.policy.restrict_to_browse_set && !self.catalog.is_in_allowed_browse_set(&model.id)
            {
                tracing::debug!("Site {}: {} outside browse set, not pooled", site, model.id);
                excluded.push((model.id.clone(), quantity));
                continue;
            }

            admitted
                .entry(model.id.to_ascii_uppercase())
                .and_modify(|(_, q)| *q = q.saturating_add(quantity))
                .or_insert_with(|| (Arc::new(model), quantity));
        }

        let pool = SitePool::mint(site, admitted.into_values());

        tracing::info!(
            "Built pool for site {}: {} instance(s), {} warning(s), {} excluded model(s)",
            site,
            pool.len(),
            warnings.len(),
            excluded.len()
        );

        PoolBuild {
            pool,
            warnings,
            excluded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(rows: &[(&str, u32)]) -> SiteInventory {
        rows.iter().map(|(m, q)| (*m, *q)).collect()
    }

    #[test]
    fn test_structurally_special_models_are_excluded() {
        let catalog = Catalog::builtin();
        let build = PoolBuilder::new(&catalog, FilterPolicy::default()).build(
            "S1",
            &inventory(&[("LK117", 2), ("PROFIBUS-DP", 2), ("LK411", 3)]),
        );

        assert_eq!(build.pool.len(), 3);
        assert_eq!(build.pool.count_of("LK411"), 3);
        assert_eq!(build.excluded.len(), 2);
        assert!(build.warnings.is_empty());
    }

    #[test]
    fn test_default_policy_keeps_unclassified_models() {
        let catalog = Catalog::builtin();
        let build = PoolBuilder::new(&catalog, FilterPolicy::default())
            .build("S1", &inventory(&[("VENDOR-X1", 2), ("LE5600", 1)]));

        assert_eq!(build.pool.count_of("VENDOR-X1"), 2);
        assert_eq!(build.pool.count_of("LE5600"), 1);
    }

    #[test]
    fn test_uncatalogued_case_variants_mint_one_uppercase_model() {
        let catalog = Catalog::builtin();
        let build = PoolBuilder::new(&catalog, FilterPolicy::default())
            .build("S1", &inventory(&[("vendor-x1", 1), ("Vendor-X1", 2)]));

        assert_eq!(build.pool.len(), 3);
        assert!(build.pool.instances().iter().all(|i| i.model_id() == "VENDOR-X1"));
    }

    #[test]
    fn test_browse_set_restriction_is_opt_in() {
        let catalog = Catalog::builtin();
        let policy = FilterPolicy {
            restrict_to_browse_set: true,
            ..Default::default()
        };
        let build =
            PoolBuilder::new(&catalog, policy).build("S1", &inventory(&[("LE5600", 1), ("LK610", 2)]));

        assert_eq!(build.pool.len(), 2);
        assert_eq!(build.excluded, vec![("LE5600".to_string(), 1)]);
    }

    #[test]
    fn test_strict_policy_reports_unknown_models() {
        let catalog = Catalog::builtin();
        let policy = FilterPolicy {
            require_catalog_membership: true,
            ..Default::default()
        };
        let build = PoolBuilder::new(&catalog, policy)
            .build("S1", &inventory(&[("VENDOR-X1", 2), ("LK411", 1)]));

        assert_eq!(build.pool.len(), 1);
        assert_eq!(
            build.warnings,
            vec![PoolWarning::UnknownModel {
                model: "VENDOR-X1".to_string(),
                quantity: 2
            }]
        );
    }

    #[test]
    fn test_mint_order_is_ascending_by_model() {
        let catalog = Catalog::builtin();
        let build = PoolBuilder::new(&catalog, FilterPolicy::default())
            .build("S1", &inventory(&[("LK710", 1), ("LK411", 1), ("LK610", 1)]));

        let order: Vec<&str> = build.pool.instances().iter().map(|i| i.model_id()).collect();
        assert_eq!(order, vec!["LK411", "LK610", "LK710"]);
    }

    #[test]
    fn test_case_variants_merge() {
        let catalog = Catalog::builtin();
        let build = PoolBuilder::new(&catalog, FilterPolicy::default())
            .build("S1", &inventory(&[("LK411", 1), ("lk411", 2)]));

        assert_eq!(build.pool.count_of("LK411"), 3);
        let ordinals: Vec<u32> = build.pool.instances().iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }
}
