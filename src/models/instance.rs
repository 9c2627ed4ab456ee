use crate::models::ModuleModel;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Every pool build draws a fresh generation, so an id minted by one build
/// can never address an instance of another.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identity of a module instance: the pool generation that minted it and
/// its index in that pool's arena.
///
/// Ids are only meaningful against the pool that minted them. Nothing that
/// outlives a pool rebuild (cache entries, persisted records) holds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId {
    generation: u64,
    index: u32,
}

impl InstanceId {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.index)
    }
}

/// One physical occurrence of a model at a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInstance {
    pub id: InstanceId,
    pub model: Arc<ModuleModel>,
    /// Rank among same-model siblings at mint time, starting at 0.
    pub ordinal: u32,
}

impl ModuleInstance {
    pub fn model_id(&self) -> &str {
        &self.model.id
    }

    /// Display key such as `LK411_1`, stable for a given model and ordinal.
    pub fn key(&self) -> String {
        format!("{}_{}", self.model.id, self.ordinal + 1)
    }
}

/// Arena of instances minted for one site from one inventory load.
#[derive(Debug, Clone)]
pub struct SitePool {
    site: String,
    generation: u64,
    instances: Vec<ModuleInstance>,
}

impl SitePool {
    /// Mint `quantity` instances per model, in the order given.
    ///
    /// Instances of one model are contiguous in the arena with ordinals
    /// `0..quantity`.
    pub fn mint<I>(site: &str, models: I) -> Self
    where
        I: IntoIterator<Item = (Arc<ModuleModel>, u32)>,
    {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let mut instances = Vec::new();

        for (model, quantity) in models {
            for ordinal in 0..quantity {
                let id = InstanceId {
                    generation,
                    index: instances.len() as u32,
                };
                instances.push(ModuleInstance {
                    id,
                    model: Arc::clone(&model),
                    ordinal,
                });
            }
        }

        Self {
            site: site.to_string(),
            generation,
            instances,
        }
    }

    /// A compositionally identical pool with fresh identities, as produced by
    /// reloading the same inventory.
    pub fn rebuild(&self) -> Self {
        let mut groups: Vec<(Arc<ModuleModel>, u32)> = Vec::new();
        for instance in &self.instances {
            match groups.last_mut() {
                Some((model, count)) if model.id == instance.model.id => *count += 1,
                _ => groups.push((Arc::clone(&instance.model), 1)),
            }
        }
        Self::mint(&self.site, groups)
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: InstanceId) -> Option<&ModuleInstance> {
        if id.generation != self.generation {
            return None;
        }
        self.instances.get(id.index())
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    pub fn instances(&self) -> &[ModuleInstance] {
        &self.instances
    }

    /// Instances of one model (case-insensitive), ascending by ordinal.
    pub fn instances_of<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a ModuleInstance> {
        self.instances
            .iter()
            .filter(move |i| i.model.id.eq_ignore_ascii_case(model))
    }

    pub fn count_of(&self, model: &str) -> usize {
        self.instances_of(model).count()
    }

    pub fn model_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for instance in &self.instances {
            *counts.entry(instance.model.id.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
