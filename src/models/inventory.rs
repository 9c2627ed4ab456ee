use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// One row of raw device data as supplied by the device-data collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub quantity: String,
}

/// A site's device inventory: model identifier → quantity.
///
/// Iteration is ascending by model identifier, which fixes the order
/// instances are minted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteInventory(BTreeMap<String, u32>);

impl SiteInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` units of `model`, summing with any existing count.
    pub fn add(&mut self, model: impl Into<String>, quantity: u32) {
        let model = model.into().trim().to_string();
        if model.is_empty() {
            return;
        }
        let count = self.0.entry(model).or_insert(0);
        match count.checked_add(quantity) {
            Some(total) => *count = total,
            None => {
                tracing::warn!(
                    "Quantity overflow summing {} + {} units, clamping to {}",
                    count,
                    quantity,
                    u32::MAX
                );
                *count = u32::MAX;
            }
        }
    }

    /// Fold raw device rows into an inventory.
    ///
    /// An empty model falls back to the brand; an empty or non-numeric
    /// quantity counts as one unit. Rows with neither are skipped.
    pub fn from_device_records(records: &[DeviceRecord]) -> Self {
        let mut inventory = Self::new();

        for (i, record) in records.iter().enumerate() {
            let model = if record.model.trim().is_empty() {
                record.brand.trim()
            } else {
                record.model.trim()
            };

            if model.is_empty() {
                tracing::debug!("Device row #{} has no model or brand, skipping", i + 1);
                continue;
            }

            let quantity = match record.quantity.trim().parse::<u32>() {
                Ok(q) => q,
                Err(_) => {
                    tracing::warn!(
                        "Device row #{} ({}) has invalid quantity '{}', counting 1",
                        i + 1,
                        model,
                        record.quantity
                    );
                    1
                }
            };

            inventory.add(model, quantity);
        }

        inventory
    }

    pub fn get(&self, model: &str) -> u32 {
        self.0.get(model).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, u32> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_units(&self) -> u64 {
        self.0.values().map(|&q| u64::from(q)).sum()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for SiteInventory {
    fn from_iter<T: IntoIterator<Item = (S, u32)>>(iter: T) -> Self {
        let mut inventory = Self::new();
        for (model, quantity) in iter {
            inventory.add(model, quantity);
        }
        inventory
    }
}

impl<'a> IntoIterator for &'a SiteInventory {
    type Item = (&'a String, &'a u32);
    type IntoIter = btree_map::Iter<'a, String, u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model: &str, brand: &str, quantity: &str) -> DeviceRecord {
        DeviceRecord {
            name: String::new(),
            brand: brand.to_string(),
            model: model.to_string(),
            quantity: quantity.to_string(),
        }
    }

    #[test]
    fn test_from_device_records_sums_duplicates() {
        let inventory = SiteInventory::from_device_records(&[
            record("LK411", "", "2"),
            record("LK411", "", "3"),
            record("LK610", "", "1"),
        ]);

        assert_eq!(inventory.get("LK411"), 5);
        assert_eq!(inventory.get("LK610"), 1);
        assert_eq!(inventory.total_units(), 6);
    }

    #[test]
    fn test_overflowing_duplicate_rows_clamp() {
        let inventory = SiteInventory::from_device_records(&[
            record("LK411", "", "4294967295"),
            record("LK411", "", "1"),
        ]);

        assert_eq!(inventory.get("LK411"), u32::MAX);
    }

    #[test]
    fn test_from_device_records_fallbacks() {
        let inventory = SiteInventory::from_device_records(&[
            record("", "LK238", "2"),
            record("LK710", "", "lots"),
            record("LK117", "", ""),
            record("", "", "4"),
        ]);

        assert_eq!(inventory.get("LK238"), 2);
        assert_eq!(inventory.get("LK710"), 1);
        assert_eq!(inventory.get("LK117"), 1);
        assert_eq!(inventory.len(), 3);
    }

    #[test]
    fn test_iteration_is_sorted() {
        let inventory: SiteInventory = [("M3", 1), ("M1", 2), ("M2", 1)].into_iter().collect();
        let models: Vec<&str> = inventory.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(models, vec!["M1", "M2", "M3"]);
    }

    #[test]
    fn test_yaml_shape_is_plain_map() {
        let inventory: SiteInventory = serde_yaml_ng::from_str("LK411: 4\nLK610: 2\n").unwrap();
        assert_eq!(inventory.get("LK411"), 4);
        assert_eq!(inventory.get("LK610"), 2);
    }
}
