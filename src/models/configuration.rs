use crate::models::{InstanceId, SlotPosition};
use std::collections::BTreeMap;

/// Persisted, instance-agnostic configuration: slot → model identifier.
///
/// Keyed by [`SlotPosition`], so iteration is rack ascending then slot
/// ascending and each slot holds at most one model.
pub type ModelConfiguration = BTreeMap<SlotPosition, String>;

/// Live, in-session configuration: slot → instance of the current pool.
pub type LiveConfiguration = BTreeMap<SlotPosition, InstanceId>;

/// Parse a configuration whose slot keys are `"rack,slot"` strings,
/// skipping keys that do not parse.
pub fn model_configuration_from_pairs<I, K, V>(pairs: I) -> ModelConfiguration
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut config = ModelConfiguration::new();
    for (key, model) in pairs {
        match key.as_ref().parse::<SlotPosition>() {
            Ok(slot) => {
                config.insert(slot, model.into());
            }
            Err(e) => tracing::warn!("Skipping configuration entry: {}", e),
        }
    }
    config
}

/// Number of slots holding each model (uppercased model identifier).
pub fn demand_by_model(config: &ModelConfiguration) -> BTreeMap<String, usize> {
    let mut demand = BTreeMap::new();
    for model in config.values() {
        *demand.entry(model.trim().to_ascii_uppercase()).or_insert(0) += 1;
    }
    demand
}
